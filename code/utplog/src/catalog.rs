/// The fixed catalog of metrics that can become time-series columns, and the fixed catalog of
/// charts that are drawn from those columns.
///
/// A metric that is not in the catalog is still parsed and can still be used for socket selection
/// and the delay histogram, but it never becomes a column.
use serde::Serialize;

/// The y axis a metric is drawn against: `x1y1` is the left (primary) axis, `x1y2` the right
/// (secondary) one.  The names are the ones gnuplot uses.

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Axis {
    #[serde(rename = "x1y1")]
    X1Y1,
    #[serde(rename = "x1y2")]
    X1Y2,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X1Y1 => "x1y1",
            Axis::X1Y2 => "x1y2",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MetricInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub axis: Axis,
    pub style: &'static str,
}

const DELAY_SAMPLES: &str = "dots lc rgb \"blue\"";
const DELAY_BASE: &str = "steps lw 2 lc rgb \"purple\"";
const TARGET_DELAY: &str = "steps lw 2 lc rgb \"red\"";
const OFF_TARGET: &str = "dots lc rgb \"blue\"";
const CWND: &str = "steps lc rgb \"green\"";
const WINDOW_SIZE: &str = "steps lc rgb \"sea-green\"";
const RTT: &str = "lines lc rgb \"light-blue\"";

macro_rules! metric {
    ($name:expr, $label:expr, $axis:ident, $style:expr) => {
        MetricInfo {
            name: $name,
            label: $label,
            axis: Axis::$axis,
            style: $style,
        }
    };
}

pub static METRICS: [MetricInfo; 17] = [
    metric!("our_delay", "our delay (ms)", X1Y2, DELAY_SAMPLES),
    metric!("upload_rate", "send rate (B/s)", X1Y1, "lines"),
    metric!("max_window", "cwnd (B)", X1Y1, CWND),
    metric!("target_delay", "target delay (ms)", X1Y2, TARGET_DELAY),
    metric!("cur_window", "bytes in-flight (B)", X1Y1, WINDOW_SIZE),
    metric!("cur_window_packets", "number of packets in-flight", X1Y2, "steps"),
    metric!("packet_size", "current packet size (B)", X1Y2, "steps"),
    metric!("rtt", "rtt (ms)", X1Y2, RTT),
    metric!("off_target", "off-target (ms)", X1Y2, OFF_TARGET),
    metric!("delay_sum", "delay sum (ms)", X1Y2, "steps"),
    metric!("their_delay", "their delay (ms)", X1Y2, DELAY_SAMPLES),
    metric!("get_microseconds", "clock (us)", X1Y1, "steps"),
    metric!("wnduser", "advertised window size (B)", X1Y1, "steps"),
    metric!("delay_base", "delay base (us)", X1Y1, DELAY_BASE),
    metric!("their_delay_base", "their delay base (us)", X1Y1, DELAY_BASE),
    metric!("their_actual_delay", "their actual delay (us)", X1Y1, DELAY_SAMPLES),
    metric!("actual_delay", "actual_delay (us)", X1Y1, DELAY_SAMPLES),
];

/// Catalog lookup by metric name.

pub fn lookup_metric(name: &str) -> Option<&'static MetricInfo> {
    METRICS.iter().find(|m| m.name == name)
}

pub fn is_known_metric(name: &str) -> bool {
    lookup_metric(name).is_some()
}

/// One chart: a title suffix, the metrics it would like to show (some of which may not be in the
/// catalog or in the data), and labels for the two y axes.

#[derive(Debug)]
pub struct ChartGroup {
    pub title: &'static str,
    pub metrics: &'static [&'static str],
    pub y1_label: &'static str,
    pub y2_label: &'static str,
}

pub static CHART_GROUPS: [ChartGroup; 12] = [
    ChartGroup {
        title: "send-packet-size",
        metrics: &["max_window", "send_window", "cur_window", "rtt"],
        y1_label: "Bytes",
        y2_label: "Time (ms)",
    },
    ChartGroup {
        title: "uploading",
        metrics: &[
            "our_delay",
            "max_window",
            "cur_window",
            "wnduser",
            "cur_window_packets",
            "packet_size",
            "rtt",
        ],
        y1_label: "Bytes",
        y2_label: "Time (ms)",
    },
    ChartGroup {
        title: "uploading_packets",
        metrics: &["our_delay", "max_window", "cur_window", "cur_window_packets"],
        y1_label: "Bytes",
        y2_label: "Time (ms)",
    },
    ChartGroup {
        title: "timer",
        metrics: &["get_microseconds"],
        y1_label: "Time microseconds",
        y2_label: "Time (ms)",
    },
    ChartGroup {
        title: "their_delay",
        metrics: &["their_delay", "target_delay", "rtt"],
        y1_label: "",
        y2_label: "Time (ms)",
    },
    ChartGroup {
        title: "packet-size",
        metrics: &["packet_size"],
        y1_label: "",
        y2_label: "Bytes",
    },
    ChartGroup {
        title: "rtt",
        metrics: &["max_window", "cur_window", "rtt"],
        y1_label: "Bytes",
        y2_label: "Time (ms)",
    },
    ChartGroup {
        title: "delay_base",
        metrics: &["delay_base", "their_delay_base"],
        y1_label: "Time (us)",
        y2_label: "",
    },
    ChartGroup {
        title: "their_delay_base",
        metrics: &["their_delay", "their_actual_delay"],
        y1_label: "Time (us)",
        y2_label: "",
    },
    ChartGroup {
        title: "actual_delay",
        metrics: &["actual_delay", "their_actual_delay"],
        y1_label: "Time (us)",
        y2_label: "",
    },
    ChartGroup {
        title: "delay_base_actual",
        metrics: &["delay_base", "their_delay_base", "actual_delay"],
        y1_label: "Time (us)",
        y2_label: "",
    },
    ChartGroup {
        title: "delay_sum",
        metrics: &["actual_delay", "our_delay", "their_delay", "delay_sum"],
        y1_label: "Time (us)",
        y2_label: "Time (ms)",
    },
];

#[test]
fn test_lookup() {
    let m = lookup_metric("max_window").unwrap();
    assert!(m.label == "cwnd (B)");
    assert!(m.axis == Axis::X1Y1);
    assert!(m.style == "steps lc rgb \"green\"");
    assert!(lookup_metric("our_delay").unwrap().axis == Axis::X1Y2);
    assert!(!is_known_metric("scaled_gain"));
    assert!(!is_known_metric("send_window"));
}

#[test]
fn test_catalog_names_unique() {
    for (i, m) in METRICS.iter().enumerate() {
        assert!(METRICS[i + 1..].iter().all(|n| n.name != m.name));
    }
    for (i, g) in CHART_GROUPS.iter().enumerate() {
        assert!(CHART_GROUPS[i + 1..].iter().all(|h| h.title != g.title));
    }
}
