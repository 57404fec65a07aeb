/// Simple, tolerant parser for the congestion-control log written by the uTP library.
///
/// Lines of interest have the shape
///
///   [<ms timestamp>] <socket>: <message>
///
/// where the message is free text interspersed with `name:value` tokens.  Three kinds of message
/// are recognized by marker substrings: connection start (`UTP_Connect`), packet loss (`lost.`)
/// and packet timeout (`Packet timeout`).  Anything else of the right shape is a sample.
///
/// NOTE:
///
/// - The log is produced by several sockets writing through one logger and by other code in the
///   same process, so it is full of lines we do not care about.  It's an important feature of this
///   parser that a line that does not have the expected shape is dropped silently, and that a
///   token that does not parse is dropped without affecting the rest of its line.  The number of
///   such drops is available in ParseStats for diagnostics.
///
/// - Marker lines are recognized even when their prefix is damaged, since they are counted and
///   carry no data of their own.
use crate::{Record, RecordKind};

use anyhow::Result;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::str::{FromStr, SplitWhitespace};
use tracing::debug;
use ustr::Ustr;

pub const CONNECT_MARKER: &str = "UTP_Connect";
pub const LOSS_MARKER: &str = "lost.";
pub const TIMEOUT_MARKER: &str = "Packet timeout";

/// Counters for what the parser dropped.

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    /// Lines presented to the parser.
    pub lines: usize,

    /// Lines dropped because they did not have the expected shape.
    pub discarded: usize,

    /// `name:value` tokens dropped because the value was not a finite number.
    pub bad_values: usize,
}

/// The parser carries a little state from line to line: the most recent timestamp, which is given
/// to marker lines that lack one, and the statistics.

#[derive(Debug, Default)]
pub struct LineParser {
    last_timestamp: i64,
    stats: ParseStats,
}

impl LineParser {
    pub fn new() -> LineParser {
        Default::default()
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Digest one line, returning None if it should be discarded.

    pub fn parse_line(&mut self, line: &str) -> Option<Record> {
        self.stats.lines += 1;

        let prefix = split_prefix(line);
        let (timestamp, socket) = match prefix {
            Some((t, s, _)) => {
                self.last_timestamp = t;
                (t, Some(Ustr::from(s)))
            }
            None => (self.last_timestamp, None),
        };

        let marker = if line.contains(CONNECT_MARKER) {
            Some(RecordKind::Connect)
        } else if line.contains(LOSS_MARKER) {
            Some(RecordKind::Loss)
        } else if line.contains(TIMEOUT_MARKER) {
            Some(RecordKind::Timeout)
        } else {
            None
        };
        if let Some(kind) = marker {
            return Some(Record {
                timestamp,
                socket,
                kind,
                metrics: vec![],
                title: if kind == RecordKind::Connect {
                    Some(line.trim().to_string())
                } else {
                    None
                },
            });
        }

        let Some((_, _, tokens)) = prefix else {
            self.stats.discarded += 1;
            return None;
        };

        let mut metrics: Vec<(Ustr, f64)> = vec![];
        for token in tokens {
            let mut parts = token.split(':');
            let (name, value) = match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(value), None) if !name.is_empty() => (name, value),
                _ => continue,
            };
            let Some(value) = get_f64(value) else {
                self.stats.bad_values += 1;
                continue;
            };
            // First value wins.
            if !metrics.iter().any(|(n, _)| n.as_str() == name) {
                metrics.push((Ustr::from(name), value));
            }
        }

        Some(Record {
            timestamp,
            socket,
            kind: RecordKind::Sample,
            metrics,
            title: None,
        })
    }
}

/// Parse a log into a vector of records, in the order encountered.  Return an error in the case of
/// I/O errors (including input that is not UTF8), but silently drop lines with parse errors.

pub fn parse_log<R: BufRead>(reader: R) -> Result<(Vec<Record>, ParseStats)> {
    let mut parser = LineParser::new();
    let mut records = vec![];
    for line in reader.lines() {
        // An error here is going to be an I/O error so always propagate it.
        let line = line?;
        if let Some(r) = parser.parse_line(&line) {
            records.push(r);
        }
    }
    let stats = parser.stats();
    debug!(
        lines = stats.lines,
        records = records.len(),
        discarded = stats.discarded,
        bad_values = stats.bad_values,
        "parsed log"
    );
    Ok((records, stats))
}

/// Parse the named log file, or standard input if the name is `-`.

pub fn parse_logfile(file_name: &str) -> Result<(Vec<Record>, ParseStats)> {
    if file_name == "-" {
        parse_log(io::stdin().lock())
    } else {
        parse_log(BufReader::new(File::open(file_name)?))
    }
}

// Returns the timestamp, the socket (without its colon), and the remaining tokens.

fn split_prefix(line: &str) -> Option<(i64, &str, SplitWhitespace<'_>)> {
    let mut tokens = line.split_whitespace();
    let stamp = tokens.next()?.strip_prefix('[')?.strip_suffix(']')?;
    let timestamp = i64::from_str(stamp).ok()?;
    let socket = tokens.next()?.strip_suffix(':')?;
    if socket.is_empty() {
        return None;
    }
    Some((timestamp, socket, tokens))
}

// NaN and the infinities parse but are not useful values.

fn get_f64(s: &str) -> Option<f64> {
    f64::from_str(s).ok().filter(|n| n.is_finite())
}

#[cfg(test)]
fn parse_str(text: &str) -> (Vec<Record>, ParseStats) {
    parse_log(io::Cursor::new(text.as_bytes())).unwrap()
}

#[test]
fn test_sample_line() {
    let mut p = LineParser::new();
    let r = p
        .parse_line("[35301484] 0x00ec1190: actual_delay:1021583 our_delay:102 their_delay:-1021345 off_target:297 scaled_gain:2.432")
        .unwrap();
    assert!(r.kind == RecordKind::Sample);
    assert!(r.timestamp == 35301484);
    assert!(r.socket == Some(Ustr::from("0x00ec1190")));
    let names = r.metrics.iter().map(|(n, _)| n.as_str()).collect::<Vec<&str>>();
    assert!(names == vec!["actual_delay", "our_delay", "their_delay", "off_target", "scaled_gain"]);
    assert!(r.metric("their_delay") == Some(-1021345.0));
    assert!(r.metric("scaled_gain") == Some(2.432));
    assert!(r.title.is_none());
}

#[test]
fn test_bad_tokens_are_skipped() {
    let mut p = LineParser::new();
    let r = p
        .parse_line("[7] s1: our_delay:abc rtt:40 bits:[0101] a:b:c seq_nr:5. :3 rate:inf free text")
        .unwrap();
    assert!(r.kind == RecordKind::Sample);
    assert!(r.metric("our_delay").is_none());
    assert!(r.metric("rtt") == Some(40.0));
    assert!(r.metric("seq_nr") == Some(5.0));
    assert!(r.metric("rate").is_none());
    assert!(r.metrics.len() == 2);
    // our_delay:abc, bits:[0101] and rate:inf have a bad value; a:b:c, :3 and the words don't
    // count as tokens at all.
    assert!(p.stats().bad_values == 3);
    assert!(p.stats().discarded == 0);
}

#[test]
fn test_duplicate_metric_keeps_first() {
    let mut p = LineParser::new();
    let r = p.parse_line("[7] s1: rtt:40 rtt:50").unwrap();
    assert!(r.metrics.len() == 1);
    assert!(r.metric("rtt") == Some(40.0));
}

#[test]
fn test_discarded_lines() {
    let (records, stats) = parse_str(
        "\n\
         log started\n\
         [abc] s1: our_delay:4\n\
         [12 s1: our_delay:4\n\
         [12] s1 our_delay:4\n\
         [12] : our_delay:4\n\
         [12]\n\
         [13] s1: our_delay:5\n",
    );
    assert!(records.len() == 1);
    assert!(records[0].metric("our_delay") == Some(5.0));
    assert!(stats.lines == 8);
    assert!(stats.discarded == 7);
}

#[test]
fn test_markers() {
    let (records, stats) = parse_str(
        "[100] s1: UTP_Connect conn_seed:1234 packet_size:1435 (B) target_delay:100 (ms)\n\
         [110] s1: Packet 17 lost. Resending\n\
         [120] s1: Packet timeout. Resend. seq_nr:3. timeout:500 max_window:2687 cur_window_packets:2\n\
         garbage Packet 18 lost. Resending\n\
         Packet timeout. Resend.\n\
         UTP_Connect conn_seed:99\n",
    );
    assert!(stats.discarded == 0);
    let kinds = records.iter().map(|r| r.kind).collect::<Vec<RecordKind>>();
    assert!(
        kinds
            == vec![
                RecordKind::Connect,
                RecordKind::Loss,
                RecordKind::Timeout,
                RecordKind::Loss,
                RecordKind::Timeout,
                RecordKind::Connect
            ]
    );
    assert!(
        records[0].title.as_deref()
            == Some("[100] s1: UTP_Connect conn_seed:1234 packet_size:1435 (B) target_delay:100 (ms)")
    );
    assert!(records.iter().all(|r| r.metrics.is_empty()));
    assert!(records[2].socket == Some(Ustr::from("s1")));
    // Lines without a prefix borrow the last timestamp and have no socket.
    assert!(records[3].socket.is_none());
    assert!(records[3].timestamp == 120);
    assert!(records[5].title.as_deref() == Some("UTP_Connect conn_seed:99"));
}

#[test]
fn test_sample_without_metrics() {
    let mut p = LineParser::new();
    let r = p.parse_line("[5] s2: Sending ACK 17 [3]").unwrap();
    assert!(r.kind == RecordKind::Sample);
    assert!(r.metrics.is_empty());
}
