/// Build the time-series table for one socket (or all of them).
///
/// The table is a matrix with time running down the column and metrics running across the row.
/// The columns are not declared up front: the first sample with metrics freezes the column schema
/// to the catalog metrics found on it, in the order they appear on the line.  From then on every
/// row is laid out by that schema, and a metric missing from a later sample leaves a hole (None) in
/// its row rather than shifting the other values.
///
/// Two trailing columns count the packet losses and timeouts seen since the previous row, scaled by
/// EVENT_SCALE so that they show up at a visible height on the same chart as the delays.
///
/// The max_window column is special: its value is the sum of the last known max_window across all
/// sockets that have reported one, ie, the total congestion window of all connections.  When a
/// single socket is selected, only that socket's records are looked at and the sum degenerates to
/// the socket's own value, unless `cross_socket_window` is set.
use crate::catalog::is_known_metric;
use crate::{AnalysisError, Record, RecordKind, SocketFilter, INDICATOR_METRIC};

use tracing::debug;
use ustr::Ustr;

pub const WINDOW_METRIC: &str = "max_window";

/// Multiplier for the loss and timeout counts.

pub const EVENT_SCALE: f64 = 8000.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeriesOptions {
    /// Update the per-socket max_window table from every socket's samples, not just the selected
    /// socket's.  Rows are still only emitted for the selected socket.
    pub cross_socket_window: bool,

    /// Only samples that carry INDICATOR_METRIC produce rows (and may freeze the schema).
    pub indicator_rows_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Seconds since the first row.
    pub time: f64,

    /// One slot per schema column, None where the sample lacked the metric.
    pub values: Vec<Option<f64>>,

    /// Scaled loss and timeout counts since the previous row.
    pub loss: f64,
    pub timeout: f64,
}

impl Row {
    /// The number of column slots, including time and the two event columns.
    pub fn width(&self) -> usize {
        1 + self.values.len() + 2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub schema: Vec<Ustr>,
    pub rows: Vec<Row>,
    pub title: String,
}

/// The builder owns all the accumulators for a run.  Feed it every record in file order with
/// `push`, then call `finish`.

pub struct TimeSeriesBuilder {
    filter: SocketFilter,
    options: SeriesOptions,
    schema: Option<Vec<Ustr>>,
    begin: Option<i64>,
    loss_count: u32,
    timeout_count: u32,
    // Last max_window per socket, in first-seen order so that the sum is reproducible.
    windows: Vec<(Ustr, f64)>,
    connect_line: Option<String>,
    rows: Vec<Row>,
}

impl TimeSeriesBuilder {
    pub fn new(filter: SocketFilter, options: SeriesOptions) -> TimeSeriesBuilder {
        TimeSeriesBuilder {
            filter,
            options,
            schema: None,
            begin: None,
            loss_count: 0,
            timeout_count: 0,
            windows: vec![],
            connect_line: None,
            rows: vec![],
        }
    }

    pub fn push(&mut self, r: &Record) {
        if self.options.cross_socket_window && r.is_sample() {
            self.note_window(r);
        }
        if !self.filter.admits(r.socket) {
            return;
        }
        match r.kind {
            RecordKind::Connect => {
                self.connect_line = r.title.clone();
            }
            RecordKind::Loss => {
                self.loss_count += 1;
            }
            RecordKind::Timeout => {
                self.timeout_count += 1;
            }
            RecordKind::Sample => {
                self.sample(r);
            }
        }
    }

    fn note_window(&mut self, r: &Record) {
        if let (Some(socket), Some(w)) = (r.socket, r.metric(WINDOW_METRIC)) {
            match self.windows.iter_mut().find(|(s, _)| *s == socket) {
                Some(slot) => slot.1 = w,
                None => self.windows.push((socket, w)),
            }
        }
    }

    fn sample(&mut self, r: &Record) {
        if r.metrics.is_empty() {
            return;
        }
        if self.options.indicator_rows_only && !r.has_metric(INDICATOR_METRIC) {
            return;
        }
        if !self.options.cross_socket_window {
            self.note_window(r);
        }

        // The first qualifying sample freezes the schema.
        let schema = self.schema.get_or_insert_with(|| {
            let schema = r
                .metrics
                .iter()
                .map(|(name, _)| *name)
                .filter(|name| is_known_metric(name))
                .collect::<Vec<Ustr>>();
            debug!(columns = schema.len(), "froze column schema");
            schema
        });

        let begin = *self.begin.get_or_insert(r.timestamp);
        // Timestamps can be any i64, so the difference may not fit in one.
        let time = (r.timestamp as i128 - begin as i128) as f64 / 1000.0;

        let windows = &self.windows;
        let values = schema
            .iter()
            .map(|name| {
                let v = r.metric(name)?;
                if name.as_str() == WINDOW_METRIC {
                    Some(windows.iter().map(|(_, w)| w).sum::<f64>().trunc())
                } else {
                    Some(v)
                }
            })
            .collect::<Vec<Option<f64>>>();
        assert!(values.len() == schema.len());

        self.rows.push(Row {
            time,
            values,
            loss: self.loss_count as f64 * EVENT_SCALE,
            timeout: self.timeout_count as f64 * EVENT_SCALE,
        });
        self.loss_count = 0;
        self.timeout_count = 0;
    }

    /// Return the table, or EmptyInput if the filter let no rows through.

    pub fn finish(self) -> Result<TimeSeries, AnalysisError> {
        if self.rows.is_empty() {
            return Err(AnalysisError::EmptyInput(format!(
                "no samples for socket {}",
                self.filter
            )));
        }
        let title = match self.connect_line {
            Some(line) => match self.filter {
                SocketFilter::All => format!("{line} sum of all sockets"),
                SocketFilter::Socket(s) => format!("{line} socket: {s}"),
            },
            None => "-".to_string(),
        };
        debug!(rows = self.rows.len(), "built time series");
        Ok(TimeSeries {
            schema: self.schema.unwrap_or_default(),
            rows: self.rows,
            title,
        })
    }
}

pub fn build_time_series(
    records: &[Record],
    filter: SocketFilter,
    options: SeriesOptions,
) -> Result<TimeSeries, AnalysisError> {
    let mut builder = TimeSeriesBuilder::new(filter, options);
    for r in records {
        builder.push(r);
    }
    builder.finish()
}

#[cfg(test)]
fn records_of(text: &str) -> Vec<Record> {
    crate::parse_log(std::io::Cursor::new(text.as_bytes()))
        .unwrap()
        .0
}

#[cfg(test)]
fn socket(s: &str) -> SocketFilter {
    SocketFilter::Socket(Ustr::from(s))
}

#[test]
fn test_schema_and_rows() {
    let records = records_of(
        "[1000] s1: our_delay:100 scaled_gain:1.5 rtt:40 max_window:3000\n\
         [1500] s2: our_delay:7 rtt:1 max_window:9000\n\
         [2500] s1: rtt:45 our_delay:150 max_window:3100 cur_window:10\n\
         [4000] s1: our_delay:50\n",
    );
    let ts = build_time_series(&records, socket("s1"), Default::default()).unwrap();
    let schema = ts.schema.iter().map(|s| s.as_str()).collect::<Vec<&str>>();
    assert!(schema == vec!["our_delay", "rtt", "max_window"]);
    assert!(ts.rows.len() == 3);
    assert!(ts.rows.iter().all(|r| r.width() == 1 + 3 + 2));
    assert!(ts.rows[0].time == 0.0);
    assert!(ts.rows[1].time == 1.5);
    assert!(ts.rows[2].time == 3.0);
    assert!(ts.rows[0].values == vec![Some(100.0), Some(40.0), Some(3000.0)]);
    // Column order is the schema's, not the line's; cur_window is not a column.
    assert!(ts.rows[1].values == vec![Some(150.0), Some(45.0), Some(3100.0)]);
    // Missing metrics are holes, not zeroes.
    assert!(ts.rows[2].values == vec![Some(50.0), None, None]);
    assert!(ts.title == "-");
}

#[test]
fn test_loss_and_timeout_columns() {
    let records = records_of(
        "[10] s1: Packet 4 lost. Resending\n\
         [11] s1: Packet 5 lost. Resending\n\
         [11] s2: Packet 9 lost. Resending\n\
         [12] s1: our_delay:10\n\
         [13] s1: Packet timeout. Resend. seq_nr:3. timeout:500 max_window:2687\n\
         [14] s1: our_delay:11\n\
         [15] s1: our_delay:12\n",
    );
    let ts = build_time_series(&records, socket("s1"), Default::default()).unwrap();
    assert!(ts.rows.len() == 3);
    assert!(ts.rows[0].loss == 16000.0);
    assert!(ts.rows[0].timeout == 0.0);
    assert!(ts.rows[1].loss == 0.0);
    assert!(ts.rows[1].timeout == 8000.0);
    assert!(ts.rows[2].loss == 0.0 && ts.rows[2].timeout == 0.0);
}

#[test]
fn test_window_sum() {
    let text = "[0] a: our_delay:1 max_window:1000\n\
                [1] b: our_delay:1 max_window:500\n\
                [2] a: our_delay:1 max_window:1200.7\n\
                [3] b: our_delay:1 rtt:5\n";
    let records = records_of(text);

    // With a socket filter the other socket is never seen.
    let ts = build_time_series(&records, socket("a"), Default::default()).unwrap();
    assert!(ts.rows.iter().map(|r| r.values[1]).collect::<Vec<_>>() == vec![Some(1000.0), Some(1200.0)]);

    // With all sockets the column is the running total, truncated.
    let ts = build_time_series(&records, SocketFilter::All, Default::default()).unwrap();
    assert!(
        ts.rows.iter().map(|r| r.values[1]).collect::<Vec<_>>()
            == vec![Some(1000.0), Some(1500.0), Some(1700.0), None]
    );

    // Cross-socket totals while only emitting rows for one socket.
    let opts = SeriesOptions {
        cross_socket_window: true,
        ..Default::default()
    };
    let ts = build_time_series(&records, socket("a"), opts).unwrap();
    assert!(ts.rows.iter().map(|r| r.values[1]).collect::<Vec<_>>() == vec![Some(1000.0), Some(1700.0)]);
}

#[test]
fn test_title() {
    let records = records_of(
        "[0] a: UTP_Connect conn_seed:5 packet_size:1435 (B)\n\
         [1] a: our_delay:1\n",
    );
    let ts = build_time_series(&records, socket("a"), Default::default()).unwrap();
    assert!(ts.title == "[0] a: UTP_Connect conn_seed:5 packet_size:1435 (B) socket: a");
    let ts = build_time_series(&records, SocketFilter::All, Default::default()).unwrap();
    assert!(ts.title == "[0] a: UTP_Connect conn_seed:5 packet_size:1435 (B) sum of all sockets");
}

#[test]
fn test_rows_need_metrics() {
    let records = records_of(
        "[0] a: Sending ACK 3 [1]\n\
         [5] a: rtt:20\n\
         [9] a: our_delay:4 rtt:21\n",
    );
    let ts = build_time_series(&records, socket("a"), Default::default()).unwrap();
    assert!(ts.schema == vec![Ustr::from("rtt")]);
    assert!(ts.rows.len() == 2);
    assert!(ts.rows[0].time == 0.0);

    let opts = SeriesOptions {
        indicator_rows_only: true,
        ..Default::default()
    };
    let ts = build_time_series(&records, socket("a"), opts).unwrap();
    assert!(ts.schema == vec![Ustr::from("our_delay"), Ustr::from("rtt")]);
    assert!(ts.rows.len() == 1);
    assert!(ts.rows[0].time == 0.0);
}

#[test]
fn test_no_rows() {
    let records = records_of("[0] a: our_delay:1\n");
    assert!(matches!(
        build_time_series(&records, socket(""), Default::default()),
        Err(AnalysisError::EmptyInput(_))
    ));
    assert!(matches!(
        build_time_series(&records, socket("b"), Default::default()),
        Err(AnalysisError::EmptyInput(_))
    ));
}

#[test]
fn test_time_is_monotonic() {
    let mut text = String::new();
    for i in 0..50 {
        text += &format!("[{}] a: our_delay:{} rtt:{}\n", 1000 + i * 37, i, i * 2);
        if i % 7 == 0 {
            text += &format!("[{}] b: our_delay:1\n", 900 + i);
        }
    }
    let ts = build_time_series(&records_of(&text), socket("a"), Default::default()).unwrap();
    assert!(ts.rows[0].time == 0.0);
    assert!(ts.rows.windows(2).all(|w| w[0].time <= w[1].time));
}

#[test]
fn test_window_sum_is_reproducible() {
    let records = records_of(
        "[0] a: our_delay:1 max_window:0.7\n\
         [1] b: our_delay:1 max_window:0.1\n\
         [2] c: our_delay:1 max_window:0.2\n",
    );
    // Added in file order the windows make exactly 1.0; adding 0.7 and 0.2 first falls just short
    // and would truncate to 0.
    for _ in 0..50 {
        let ts = build_time_series(&records, SocketFilter::All, Default::default()).unwrap();
        assert!(ts.rows[2].values[1] == Some(1.0));
    }
}

#[test]
fn test_extreme_timestamps() {
    let records = records_of(
        "[-9223372036854775808] a: our_delay:1\n\
         [1] a: our_delay:2\n",
    );
    let ts = build_time_series(&records, socket("a"), Default::default()).unwrap();
    assert!(ts.rows.len() == 2);
    assert!(ts.rows[1].time > 9.2e15);
}

#[test]
fn test_unattributed_loss_is_counted() {
    let records = records_of(
        "[1] a: our_delay:1\n\
         Packet 3 lost. Resending\n\
         [2] b: Packet 4 lost. Resending\n\
         [3] a: our_delay:2\n",
    );
    let ts = build_time_series(&records, socket("a"), Default::default()).unwrap();
    assert!(ts.rows.len() == 2);
    assert!(ts.rows[1].loss == 8000.0);
}
