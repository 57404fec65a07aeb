/// The uTP library can be asked to log its congestion-control state.  The log is a stream of
/// *lines*, each (when it is of interest) prefixed by a millisecond timestamp and the identity of
/// the *socket* (logical connection) it pertains to.  Many sockets write to the same stream, and
/// their lines are interleaved.  The lines themselves are free text with `name:value` tokens
/// sprinkled in, and a few marker phrases that signal connection start, packet loss and packet
/// timeout.
///
/// This library has as its fundamental task to turn such a log into data that can be plotted.
/// That task breaks down into a number of subtasks:
///
/// - Parse the lines into *records*, tolerating (and dropping) the many lines and tokens that do not
///   fit the expected shape.
///
/// - Select the socket to look at, by default the one with the most delay samples.
///
/// - Build a *time series* for the selected socket: one row per sample, with a stable set of
///   columns determined by the first sample, and with loss and timeout counts folded into the rows.
///
/// - Build a histogram of the delay samples.
///
/// - Describe the charts that can be drawn from the time series.
///
/// The whole thing is a batch job over a single log: at most one pass to select a socket and one
/// pass to build the table and histogram.
mod catalog;
mod error;
mod histogram;
mod logfile;
mod plot;
mod record;
mod select;
mod series;

use tracing::info;

// A parsed log line.

pub use record::Record;
pub use record::RecordKind;

// Parse a log from a reader or a file ("-" is stdin) into records, in file order, with statistics
// about the lines and tokens that were dropped.

pub use logfile::parse_log;
pub use logfile::parse_logfile;
pub use logfile::LineParser;
pub use logfile::ParseStats;

// The fixed metric and chart catalogs.

pub use catalog::lookup_metric;
pub use catalog::is_known_metric;
pub use catalog::Axis;
pub use catalog::ChartGroup;
pub use catalog::MetricInfo;
pub use catalog::CHART_GROUPS;
pub use catalog::METRICS;

// Run-level errors.

pub use error::AnalysisError;

// Socket selection: the filter, the ranking, and the choice.

pub use select::rank_sockets;
pub use select::select_socket;
pub use select::Selection;
pub use select::SocketCount;
pub use select::SocketFilter;
pub use select::INDICATOR_METRIC;
pub use select::TOP_SOCKETS;

// The time series table.

pub use series::build_time_series;
pub use series::Row;
pub use series::SeriesOptions;
pub use series::TimeSeries;
pub use series::TimeSeriesBuilder;
pub use series::EVENT_SCALE;
pub use series::WINDOW_METRIC;

// The delay histogram.

pub use histogram::build_histogram;
pub use histogram::Histogram;
pub use histogram::HistogramBuilder;

// Chart descriptions and their gnuplot rendering.

pub use plot::emit as emit_plot_descriptor;
pub use plot::render_gnuplot;
pub use plot::ChartSpec;
pub use plot::HistogramSpec;
pub use plot::PlotDescriptor;
pub use plot::SeriesSpec;
pub use plot::MISSING_VALUE;

/// The result of analyzing a log.

#[derive(Debug, Clone)]
pub struct Analysis {
    pub filter: SocketFilter,

    /// The top sockets, if the socket was selected automatically.
    pub ranking: Vec<SocketCount>,

    pub series: TimeSeries,
    pub histogram: Histogram,
}

/// Which socket(s) to analyze.  `None` selects the most frequent socket.
///
/// The table and the histogram are built in a single pass over the records once the socket is
/// known.  EmptyInput is returned if there is nothing to select from or the selected socket has no
/// rows, InvalidQuantization if `quantization` cannot be a bucket width.

pub fn analyze(
    records: &[Record],
    requested: Option<SocketFilter>,
    quantization: f64,
    options: SeriesOptions,
) -> Result<Analysis, AnalysisError> {
    if !quantization.is_finite() || quantization <= 0.0 {
        return Err(AnalysisError::InvalidQuantization(quantization.to_string()));
    }

    let (filter, ranking) = match requested {
        Some(f) => (f, vec![]),
        None => {
            let sel = select_socket(records, None)?;
            (SocketFilter::Socket(sel.socket), sel.ranking)
        }
    };

    let mut series = TimeSeriesBuilder::new(filter.clone(), options);
    let mut histogram = HistogramBuilder::new(filter.clone(), quantization);
    for r in records {
        series.push(r);
        histogram.push(r);
    }
    let series = series.finish()?;
    let histogram = histogram.finish();
    info!(
        socket = %filter,
        rows = series.rows.len(),
        columns = series.schema.len(),
        buckets = histogram.buckets().count(),
        "analysis complete"
    );

    Ok(Analysis {
        filter,
        ranking,
        series,
        histogram,
    })
}

#[cfg(test)]
fn records_of(text: &str) -> Vec<Record> {
    parse_log(std::io::Cursor::new(text.as_bytes())).unwrap().0
}

#[test]
fn test_analyze_selects_socket() {
    let mut text = String::new();
    for i in 0..10 {
        text += &format!("[{}] a: our_delay:{} rtt:9\n", i * 10, 100 + i);
    }
    for i in 0..3 {
        text += &format!("[{}] b: our_delay:{}\n", i * 10 + 5, 7);
    }
    let a = analyze(&records_of(&text), None, 1.0, Default::default()).unwrap();
    assert!(a.filter == SocketFilter::Socket("a".into()));
    assert!(a.ranking.len() == 2 && a.ranking[0].count == 10 && a.ranking[1].count == 3);
    assert!(a.series.rows.len() == 10);
    assert!(a.histogram.total() == 10);
    assert!(a.histogram.count(7) == 0);
}

#[test]
fn test_analyze_scenarios() {
    // Three delay samples, unit buckets.
    let records = records_of(
        "[1] s1: our_delay:100\n\
         [2] s1: our_delay:150\n\
         [3] s1: our_delay:50\n",
    );
    let a = analyze(&records, None, 1.0, Default::default()).unwrap();
    assert!(a.histogram.buckets().collect::<Vec<_>>() == vec![(50, 1), (100, 1), (150, 1)]);

    // Two losses before a sample.
    let records = records_of(
        "[1] s1: Packet 1 lost. Resending\n\
         [2] s1: Packet 2 lost. Resending\n\
         [3] s1: our_delay:10\n",
    );
    let a = analyze(&records, None, 1.0, Default::default()).unwrap();
    assert!(a.series.rows[0].loss == 16000.0);
    assert!(a.series.rows[0].timeout == 0.0);

    // Nothing carries the indicator.
    let records = records_of("[1] s1: rtt:5\nhello\n");
    assert!(matches!(
        analyze(&records, None, 1.0, Default::default()),
        Err(AnalysisError::EmptyInput(_))
    ));

    // A later sample lacks a column.
    let records = records_of(
        "[1] s1: our_delay:10 rtt:4 cur_window:100\n\
         [2] s1: our_delay:11 cur_window:120\n",
    );
    let a = analyze(&records, None, 1.0, Default::default()).unwrap();
    assert!(a.series.rows[1].width() == 1 + 3 + 2);
    assert!(a.series.rows[1].values == vec![Some(11.0), None, Some(120.0)]);
}

#[test]
fn test_analyze_explicit_filter() {
    let records = records_of("[1] a: our_delay:1\n[2] b: our_delay:2\n");
    let a = analyze(&records, Some(SocketFilter::All), 1.0, Default::default()).unwrap();
    assert!(a.ranking.is_empty());
    assert!(a.series.rows.len() == 2);
    assert!(matches!(
        analyze(&records, Some(SocketFilter::Socket("zz".into())), 1.0, Default::default()),
        Err(AnalysisError::EmptyInput(_))
    ));
}

#[test]
fn test_analyze_bad_quantization() {
    let records = records_of("[1] a: our_delay:1\n");
    for q in [0.0, -1.0, f64::INFINITY, f64::NAN] {
        assert!(matches!(
            analyze(&records, None, q, Default::default()),
            Err(AnalysisError::InvalidQuantization(_))
        ));
    }
}
