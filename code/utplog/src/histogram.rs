/// Histogram of the delay samples of the selected socket(s).
///
/// Buckets are `floor(value / width)`, so a bucket covers [k * width, (k + 1) * width).  Negative
/// samples are legal and land in negative buckets.  There is no normalization.
use crate::{Record, SocketFilter, INDICATOR_METRIC};

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    width: f64,
    buckets: BTreeMap<i64, usize>,
}

impl Histogram {
    /// `width` must be positive and finite.

    pub fn new(width: f64) -> Histogram {
        assert!(width.is_finite() && width > 0.0);
        Histogram {
            width,
            buckets: BTreeMap::new(),
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn add(&mut self, value: f64) {
        let bucket = (value / self.width).floor() as i64;
        *self.buckets.entry(bucket).or_insert(0) += 1;
    }

    pub fn count(&self, bucket: i64) -> usize {
        self.buckets.get(&bucket).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.buckets.values().sum()
    }

    /// Populated buckets in ascending order, as (bucket index, count).
    pub fn buckets(&self) -> impl Iterator<Item = (i64, usize)> + '_ {
        self.buckets.iter().map(|(k, v)| (*k, *v))
    }

    /// The midpoint of the bucket's interval.
    pub fn center(&self, bucket: i64) -> f64 {
        bucket as f64 * self.width + self.width / 2.0
    }
}

pub struct HistogramBuilder {
    filter: SocketFilter,
    histogram: Histogram,
}

impl HistogramBuilder {
    pub fn new(filter: SocketFilter, width: f64) -> HistogramBuilder {
        HistogramBuilder {
            filter,
            histogram: Histogram::new(width),
        }
    }

    pub fn push(&mut self, r: &Record) {
        if !r.is_sample() || !self.filter.admits(r.socket) {
            return;
        }
        if let Some(v) = r.metric(INDICATOR_METRIC) {
            self.histogram.add(v);
        }
    }

    pub fn finish(self) -> Histogram {
        self.histogram
    }
}

pub fn build_histogram(records: &[Record], filter: SocketFilter, width: f64) -> Histogram {
    let mut builder = HistogramBuilder::new(filter, width);
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

#[test]
fn test_unit_buckets() {
    let records = records_of(
        "[0] s1: our_delay:100 rtt:3\n\
         [1] s1: our_delay:150\n\
         [2] s1: our_delay:50\n",
    );
    let h = build_histogram(&records, SocketFilter::Socket("s1".into()), 1.0);
    assert!(h.buckets().collect::<Vec<(i64, usize)>>() == vec![(50, 1), (100, 1), (150, 1)]);
    assert!(h.center(100) == 100.5);
}

#[test]
fn test_quantized_and_negative() {
    let mut h = Histogram::new(10.0);
    for v in [0.0, 9.9, 10.0, -0.5, -10.0, -10.5, 25.0] {
        h.add(v);
    }
    assert!(h.count(0) == 2);
    assert!(h.count(1) == 1);
    assert!(h.count(-1) == 2);
    assert!(h.count(-2) == 1);
    assert!(h.count(2) == 1);
    assert!(h.count(3) == 0);
    assert!(h.total() == 7);
    assert!(h.center(-1) == -5.0);
}

#[test]
fn test_total_matches_indicator_samples() {
    let records = records_of(
        "[0] a: our_delay:1\n\
         [1] b: our_delay:2\n\
         [2] a: rtt:2\n\
         [3] a: Packet timeout. our_delay:3\n\
         [4] a: our_delay:bad\n\
         [5] a: our_delay:7 max_window:1\n",
    );
    let h = build_histogram(&records, SocketFilter::Socket("a".into()), 2.0);
    let expected = records
        .iter()
        .filter(|r| r.is_sample() && r.socket == Some("a".into()) && r.metric(INDICATOR_METRIC).is_some())
        .count();
    assert!(expected == 2);
    assert!(h.total() == expected);
    assert!(build_histogram(&records, SocketFilter::All, 2.0).total() == 3);
}
