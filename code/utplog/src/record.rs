use ustr::Ustr;

/// The classification of one log line.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordKind {
    /// A connection was started.  The line is kept as the chart title.
    Connect,

    /// A packet was lost and is being resent.
    Loss,

    /// A packet timed out and is being resent.
    Timeout,

    /// Any other line of the expected shape.  The `key:value` pairs on it are the metrics.
    Sample,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Connect => "connect",
            RecordKind::Loss => "loss",
            RecordKind::Timeout => "timeout",
            RecordKind::Sample => "sample",
        }
    }
}

/// The Record structure holds the digested contents of one log line.  Records are immutable once
/// produced by the parser.
///
/// Space matters somewhat as a log can have millions of lines: the socket and metric names are
/// Ustr so that the very common strings are not allocated over and over.

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Milliseconds, in the logger's own clock.  For marker lines that have no parseable prefix
    /// this is the timestamp of the most recent line that had one (zero if there was none), so
    /// that file order and time order agree.
    pub timestamp: i64,

    /// The socket the line was logged for, without the trailing colon.  This is None only for
    /// marker lines (connect, loss, timeout) that lack the `[timestamp] socket:` prefix.
    pub socket: Option<Ustr>,

    pub kind: RecordKind,

    /// The name:value pairs on a Sample line, in the order they appear on the line.  A name that
    /// appears more than once keeps its first value.  Always empty for other kinds.
    pub metrics: Vec<(Ustr, f64)>,

    /// For Connect records, the text of the line.  None for other kinds.
    pub title: Option<String>,
}

impl Record {
    /// The value of the named metric on this record, if present.

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| *v)
    }

    pub fn has_metric(&self, name: &str) -> bool {
        self.metrics.iter().any(|(n, _)| n.as_str() == name)
    }

    pub fn is_sample(&self) -> bool {
        self.kind == RecordKind::Sample
    }
}

#[test]
fn test_record_metric() {
    let r = Record {
        timestamp: 10,
        socket: Some(Ustr::from("0x1")),
        kind: RecordKind::Sample,
        metrics: vec![(Ustr::from("our_delay"), 12.0), (Ustr::from("rtt"), 40.0)],
        title: None,
    };
    assert!(r.is_sample());
    assert!(r.metric("rtt") == Some(40.0));
    assert!(r.metric("max_window").is_none());
    assert!(r.has_metric("our_delay"));
    assert!(!r.has_metric("our"));
}
