/// Socket selection.
///
/// A log usually has records for many sockets.  Unless the user names one, we focus on the socket
/// that logged the most delay samples, on the theory that it is the one that carried the most data.
use crate::{AnalysisError, Record};

use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};
use ustr::Ustr;

/// The metric whose occurrences are counted to pick a socket, and which feeds the delay histogram.

pub const INDICATOR_METRIC: &str = "our_delay";

/// The number of sockets in the ranking reported with an automatic selection.

pub const TOP_SOCKETS: usize = 6;

/// Which records take part in an analysis.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFilter {
    /// Records for every socket.
    All,

    /// Records for this socket only.  No check is made that the socket occurs in the log.
    Socket(Ustr),
}

impl SocketFilter {
    /// True if a record for `socket` passes the filter.  Records without a socket cannot be
    /// attributed and always pass.

    pub fn admits(&self, socket: Option<Ustr>) -> bool {
        match (self, socket) {
            (SocketFilter::All, _) | (_, None) => true,
            (SocketFilter::Socket(s), Some(t)) => *s == t,
        }
    }
}

impl fmt::Display for SocketFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketFilter::All => write!(f, "all"),
            SocketFilter::Socket(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketCount {
    pub socket: Ustr,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub socket: Ustr,

    /// The TOP_SOCKETS best sockets, best first.  Empty if the socket was requested by the user.
    pub ranking: Vec<SocketCount>,
}

/// Count the Sample records carrying the indicator metric for each socket and return the counts in
/// descending order.  Sockets with equal counts are ordered by their first appearance in
/// `records`, so the result is fully determined by the input.

pub fn rank_sockets(records: &[Record]) -> Vec<SocketCount> {
    // socket -> (first seen, count)
    let mut counts: HashMap<Ustr, (usize, usize)> = HashMap::new();
    for (i, r) in records.iter().enumerate() {
        if !r.is_sample() || !r.has_metric(INDICATOR_METRIC) {
            continue;
        }
        if let Some(socket) = r.socket {
            counts.entry(socket).or_insert((i, 0)).1 += 1;
        }
    }
    counts
        .into_iter()
        .sorted_by(|(_, (afirst, acount)), (_, (bfirst, bcount))| {
            bcount.cmp(acount).then(afirst.cmp(bfirst))
        })
        .map(|(socket, (_, count))| SocketCount { socket, count })
        .collect::<Vec<SocketCount>>()
}

/// Pick the socket to focus on.  A requested socket is returned as is.  Otherwise the most
/// frequent socket is chosen, and it is an error for there to be no candidates at all.

pub fn select_socket(
    records: &[Record],
    requested: Option<&str>,
) -> Result<Selection, AnalysisError> {
    if let Some(s) = requested {
        return Ok(Selection {
            socket: Ustr::from(s),
            ranking: vec![],
        });
    }
    let mut ranking = rank_sockets(records);
    if ranking.is_empty() {
        return Err(AnalysisError::EmptyInput(format!(
            "no sample carries the {INDICATOR_METRIC} metric"
        )));
    }
    ranking.truncate(TOP_SOCKETS);
    for sc in &ranking {
        debug!(socket = sc.socket.as_str(), count = sc.count, "candidate socket");
    }
    let socket = ranking[0].socket;
    info!(socket = socket.as_str(), "focusing on socket");
    Ok(Selection { socket, ranking })
}

#[cfg(test)]
fn sample(socket: &str, delay: Option<f64>) -> Record {
    let mut metrics = vec![(Ustr::from("rtt"), 3.0)];
    if let Some(d) = delay {
        metrics.push((Ustr::from(INDICATOR_METRIC), d));
    }
    Record {
        timestamp: 0,
        socket: Some(Ustr::from(socket)),
        kind: crate::RecordKind::Sample,
        metrics,
        title: None,
    }
}

#[test]
fn test_most_frequent_socket() {
    let mut records = vec![];
    for i in 0..13 {
        records.push(sample(if i % 4 == 0 { "b" } else { "a" }, Some(1.0)));
    }
    // Plenty of "c", but without the indicator.
    for _ in 0..20 {
        records.push(sample("c", None));
    }
    let sel = select_socket(&records, None).unwrap();
    assert!(sel.socket.as_str() == "a");
    assert!(
        sel.ranking
            == vec![
                SocketCount { socket: Ustr::from("a"), count: 9 },
                SocketCount { socket: Ustr::from("b"), count: 4 }
            ]
    );
}

#[test]
fn test_ten_versus_three() {
    let mut records = vec![];
    for _ in 0..3 {
        records.push(sample("b", Some(5.0)));
    }
    for _ in 0..10 {
        records.push(sample("a", Some(5.0)));
    }
    assert!(select_socket(&records, None).unwrap().socket.as_str() == "a");
}

#[test]
fn test_ties_and_top_six() {
    let mut records = vec![];
    for name in ["s7", "s3", "s5", "s1", "s2", "s6", "s4", "s8"] {
        records.push(sample(name, Some(1.0)));
    }
    records.push(sample("s8", Some(1.0)));
    for _ in 0..5 {
        let sel = select_socket(&records, None).unwrap();
        assert!(sel.socket.as_str() == "s8");
        let names = sel.ranking.iter().map(|s| s.socket.as_str()).collect::<Vec<&str>>();
        assert!(names == vec!["s8", "s7", "s3", "s5", "s1", "s2"]);
    }
    assert!(rank_sockets(&records).len() == 8);
}

#[test]
fn test_requested_socket() {
    let sel = select_socket(&[], Some("nonesuch")).unwrap();
    assert!(sel.socket.as_str() == "nonesuch");
    assert!(sel.ranking.is_empty());
}

#[test]
fn test_no_indicator() {
    let records = vec![sample("a", None), sample("b", None)];
    assert!(matches!(
        select_socket(&records, None),
        Err(AnalysisError::EmptyInput(_))
    ));
}

#[test]
fn test_filter_admits() {
    let a = Ustr::from("a");
    let b = Ustr::from("b");
    assert!(SocketFilter::All.admits(Some(a)));
    assert!(SocketFilter::All.admits(None));
    assert!(SocketFilter::Socket(a).admits(Some(a)));
    assert!(!SocketFilter::Socket(a).admits(Some(b)));
    assert!(SocketFilter::Socket(a).admits(None));
    assert!(SocketFilter::Socket(a).to_string() == "a");
    assert!(SocketFilter::All.to_string() == "all");
}
