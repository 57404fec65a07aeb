/// The plot descriptor: a declarative description of the charts to draw from the time-series table
/// and the histogram, and a renderer that turns it into a gnuplot script.
///
/// There is one chart per entry in CHART_GROUPS, always, even if none of the group's metrics made it
/// into the schema; the charts map 1:1 to output files.  Columns are referenced by their 1-based
/// position in the table file, the way gnuplot's `using` wants them: column 1 is time and schema
/// column i (0-based) is i + 2.
use crate::catalog::{lookup_metric, Axis, CHART_GROUPS};

use anyhow::Result;
use serde::Serialize;
use ustr::Ustr;

/// The histogram chart's x range, in ms.
pub const HISTOGRAM_X_RANGE: (f64, f64) = (0.0, 200.0);

/// The marker written into the table for absent values.
pub const MISSING_VALUE: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSpec {
    pub column: usize,
    pub metric: String,
    pub label: String,
    pub axis: Axis,
    pub style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub output: String,
    pub y1_label: String,
    pub y2_label: String,
    pub series: Vec<SeriesSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSpec {
    pub data_file: String,
    pub output: String,
    pub x_label: String,
    pub y_label: String,
    pub x_range: (f64, f64),
    pub box_width: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotDescriptor {
    pub title: String,
    pub data_file: String,
    pub charts: Vec<ChartSpec>,
    pub histogram: HistogramSpec,
}

impl PlotDescriptor {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Build the descriptor for a table with columns `schema` stored in the file `data_file`.  The
/// histogram is assumed to be in `<data_file>.histogram`; chart images are named
/// `<data_file>.<chart>.png`.

pub fn emit(schema: &[Ustr], title: &str, data_file: &str, quantization: f64) -> PlotDescriptor {
    let charts = CHART_GROUPS
        .iter()
        .map(|group| ChartSpec {
            title: format!("{} {}", group.title, title),
            output: format!("{data_file}.{}.png", group.title),
            y1_label: group.y1_label.to_string(),
            y2_label: group.y2_label.to_string(),
            series: group
                .metrics
                .iter()
                .filter_map(|name| {
                    let info = lookup_metric(name)?;
                    let pos = schema.iter().position(|c| c.as_str() == *name)?;
                    Some(SeriesSpec {
                        column: pos + 2,
                        metric: name.to_string(),
                        label: info.label.to_string(),
                        axis: info.axis,
                        style: info.style.to_string(),
                    })
                })
                .collect::<Vec<SeriesSpec>>(),
        })
        .collect::<Vec<ChartSpec>>();

    PlotDescriptor {
        title: title.to_string(),
        data_file: data_file.to_string(),
        charts,
        histogram: HistogramSpec {
            data_file: format!("{data_file}.histogram"),
            output: format!("{data_file}.delays.png"),
            x_label: "delay (ms)".to_string(),
            y_label: "number of packets".to_string(),
            x_range: HISTOGRAM_X_RANGE,
            box_width: quantization,
        },
    }
}

/// Render the descriptor as a gnuplot script.  Charts without series get a comment instead of a
/// plot command, as gnuplot rejects an empty `plot`.

pub fn render_gnuplot(desc: &PlotDescriptor) -> String {
    let h = &desc.histogram;
    let data_file = escape(&desc.data_file);
    let mut s = "set term png size 1280,800\n".to_string();
    s += format!("set datafile missing \"{MISSING_VALUE}\"\n").as_str();
    s += format!("set output \"{}\"\n", escape(&h.output)).as_str();
    s += format!("set xrange [{}:{}]\n", h.x_range.0, h.x_range.1).as_str();
    s += format!("set xlabel \"{}\"\n", h.x_label).as_str();
    s += format!("set boxwidth {}\n", h.box_width).as_str();
    s += format!("set ylabel \"{}\"\n", h.y_label).as_str();
    s += format!(
        "plot \"{}\" using 1:2 with boxes fs solid 0.3\n",
        escape(&h.data_file)
    )
    .as_str();
    s += "set autoscale x\n";

    for chart in &desc.charts {
        s += format!("set title \"{}\"\n", escape(&chart.title)).as_str();
        s += "set xlabel \"time (s)\"\n";
        s += format!("set ylabel \"{}\"\n", chart.y1_label).as_str();
        s += format!("set y2label \"{}\"\n", chart.y2_label).as_str();
        s += "set y2tics\nset grid\nset key box\n";
        s += format!("set output \"{}\"\n", escape(&chart.output)).as_str();
        if chart.series.is_empty() {
            s += "# no plottable metrics for this chart\n";
            continue;
        }
        let plots = chart
            .series
            .iter()
            .map(|p| {
                format!(
                    "\"{}\" using 1:{} title \"{}-{}\" axes {} with {}",
                    data_file,
                    p.column,
                    p.label,
                    p.axis.as_str(),
                    p.axis.as_str(),
                    p.style
                )
            })
            .collect::<Vec<String>>();
        s += format!("plot {}\n", plots.join(", ")).as_str();
    }
    s
}

// The title is the raw connect line and file names carry the socket id, either may contain
// anything.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
fn schema_of(names: &[&str]) -> Vec<Ustr> {
    names.iter().map(|n| Ustr::from(*n)).collect()
}

#[test]
fn test_one_chart_per_group() {
    let desc = emit(&schema_of(&["rtt"]), "-", "utp.out0x1", 1.0);
    assert!(desc.charts.len() == CHART_GROUPS.len());
    let timer = desc.charts.iter().find(|c| c.title == "timer -").unwrap();
    assert!(timer.series.is_empty());
    assert!(timer.output == "utp.out0x1.timer.png");
    assert!(desc.histogram.output == "utp.out0x1.delays.png");
    assert!(desc.histogram.data_file == "utp.out0x1.histogram");
}

#[test]
fn test_series_columns() {
    let schema = schema_of(&["actual_delay", "our_delay", "scaled_gain", "max_window", "rtt"]);
    let desc = emit(&schema, "t", "f", 1.0);
    let sps = desc.charts.iter().find(|c| c.title == "send-packet-size t").unwrap();
    // send_window is not in the catalog and cur_window is not in the data.
    let cols = sps
        .series
        .iter()
        .map(|p| (p.metric.as_str(), p.column))
        .collect::<Vec<(&str, usize)>>();
    assert!(cols == vec![("max_window", 5), ("rtt", 6)]);
    assert!(sps.series[0].label == "cwnd (B)");
    assert!(sps.series[0].axis == Axis::X1Y1);
    assert!(sps.series[1].axis == Axis::X1Y2);
    assert!(sps.series[1].style == "lines lc rgb \"light-blue\"");
    assert!(sps.y1_label == "Bytes" && sps.y2_label == "Time (ms)");
}

#[test]
fn test_gnuplot_script() {
    let desc = emit(&schema_of(&["our_delay", "rtt"]), "say \"hi\"", "utp.outa", 2.0);
    let script = render_gnuplot(&desc);
    assert!(script.contains("set boxwidth 2\n"));
    assert!(script.contains("plot \"utp.outa.histogram\" using 1:2 with boxes fs solid 0.3\n"));
    assert!(script.contains("set title \"rtt say \\\"hi\\\"\"\n"));
    assert!(script.contains(
        "plot \"utp.outa\" using 1:3 title \"rtt (ms)-x1y2\" axes x1y2 with lines lc rgb \"light-blue\"\n"
    ));
    assert!(script.contains("set output \"utp.outa.timer.png\"\n# no plottable metrics"));
}

#[test]
fn test_json() {
    let desc = emit(&schema_of(&["our_delay"]), "-", "f", 1.0);
    let v: serde_json::Value = serde_json::from_str(&desc.to_json().unwrap()).unwrap();
    assert!(v["charts"].as_array().unwrap().len() == CHART_GROUPS.len());
    assert!(v["charts"][1]["series"][0]["axis"] == "x1y2");
    assert!(v["charts"][1]["series"][0]["column"] == 2);
    assert!(v["histogram"]["x_range"][1] == 200.0);
}

#[test]
fn test_gnuplot_escapes_file_names() {
    let desc = emit(&schema_of(&["rtt"]), "-", "utp.out\"x", 1.0);
    let script = render_gnuplot(&desc);
    assert!(script.contains("plot \"utp.out\\\"x.histogram\" using 1:2"));
    assert!(script.contains("set output \"utp.out\\\"x.rtt.png\"\n"));
    assert!(script.contains("plot \"utp.out\\\"x\" using 1:2 title"));
    assert!(!script.contains("\"utp.out\"x"));
}
