use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::schema::{HistogramSchema, SlotType};
use crate::window::TimeWindow;

/// Call counts per latency slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Histogram {
    fast: u64,
    normal: u64,
    slow: u64,
    very_slow: u64,
    error: u64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_call_count(&mut self, slot_type: SlotType, count: u64) {
        match slot_type {
            SlotType::Fast => self.fast += count,
            SlotType::Normal => self.normal += count,
            SlotType::Slow => self.slow += count,
            SlotType::VerySlow => self.very_slow += count,
            SlotType::Error => self.error += count,
        }
    }

    pub fn get(&self, slot_type: SlotType) -> u64 {
        match slot_type {
            SlotType::Fast => self.fast,
            SlotType::Normal => self.normal,
            SlotType::Slow => self.slow,
            SlotType::VerySlow => self.very_slow,
            SlotType::Error => self.error,
        }
    }

    pub fn add(&mut self, other: &Histogram) {
        self.fast += other.fast;
        self.normal += other.normal;
        self.slow += other.slow;
        self.very_slow += other.very_slow;
        self.error += other.error;
    }

    pub fn total_count(&self) -> u64 {
        self.fast + self.normal + self.slow + self.very_slow + self.error
    }

    pub fn error_count(&self) -> u64 {
        self.error
    }

    /// Calls that completed without error, whatever their latency
    pub fn success_count(&self) -> u64 {
        self.total_count() - self.error
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    /// View that serializes with the slot labels of a schema
    pub fn labeled<'a>(&'a self, schema: &'a HistogramSchema) -> LabeledHistogram<'a> {
        LabeledHistogram {
            histogram: self,
            schema,
        }
    }
}

/// Histogram keyed by its schema's slot labels, in slot order
pub struct LabeledHistogram<'a> {
    histogram: &'a Histogram,
    schema: &'a HistogramSchema,
}

impl Serialize for LabeledHistogram<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SlotType::ALL.len()))?;
        for slot_type in SlotType::ALL {
            map.serialize_entry(self.schema.label(slot_type), &self.histogram.get(slot_type))?;
        }
        map.end()
    }
}

/// Histograms per time bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeriesHistogram {
    buckets: BTreeMap<i64, Histogram>,
}

impl TimeSeriesHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_call_count(&mut self, timestamp: i64, slot_type: SlotType, count: u64) {
        self.buckets
            .entry(timestamp)
            .or_default()
            .add_call_count(slot_type, count);
    }

    pub fn merge(&mut self, other: &TimeSeriesHistogram) {
        for (timestamp, histogram) in &other.buckets {
            self.buckets.entry(*timestamp).or_default().add(histogram);
        }
    }

    pub fn get(&self, timestamp: i64) -> Option<&Histogram> {
        self.buckets.get(&timestamp)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &Histogram)> {
        self.buckets.iter().map(|(ts, h)| (*ts, h))
    }

    /// Sum over all buckets
    pub fn total(&self) -> Histogram {
        self.buckets.values().fold(Histogram::new(), |mut acc, h| {
            acc.add(h);
            acc
        })
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.values().map(|h| h.total_count()).sum()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Same counts regrouped into the buckets of a coarser window
    pub fn rebucket(&self, window: &TimeWindow) -> TimeSeriesHistogram {
        let mut rebucketed = TimeSeriesHistogram::new();
        for (timestamp, histogram) in &self.buckets {
            rebucketed
                .buckets
                .entry(window.refine_timestamp(*timestamp))
                .or_default()
                .add(histogram);
        }
        rebucketed
    }

    /// One entry per window bucket, empty buckets included
    pub fn zero_filled(&self, window: &TimeWindow) -> Vec<(i64, Histogram)> {
        window
            .iter()
            .map(|ts| (ts, self.buckets.get(&ts).copied().unwrap_or_default()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NORMAL_SCHEMA;
    use crate::window::{FixedWindowSampler, Range, TimeWindowDownSampler, ONE_HOUR, ONE_MINUTE};

    #[test]
    fn test_histogram_counts() {
        let mut h = Histogram::new();
        h.add_call_count(SlotType::Fast, 3);
        h.add_call_count(SlotType::VerySlow, 1);
        h.add_call_count(SlotType::Error, 2);

        assert_eq!(h.total_count(), 6);
        assert_eq!(h.error_count(), 2);
        assert_eq!(h.success_count(), 4);
        assert_eq!(h.get(SlotType::Normal), 0);
    }

    #[test]
    fn test_labeled_serialization() {
        let mut h = Histogram::new();
        h.add_call_count(SlotType::Normal, 5);
        let json = serde_json::to_value(h.labeled(&NORMAL_SCHEMA)).unwrap();
        assert_eq!(json["3s"], 5);
        assert_eq!(json["1s"], 0);
        assert_eq!(json["Error"], 0);
    }

    #[test]
    fn test_time_series_merge() {
        let mut a = TimeSeriesHistogram::new();
        a.add_call_count(0, SlotType::Fast, 1);
        let mut b = TimeSeriesHistogram::new();
        b.add_call_count(0, SlotType::Fast, 2);
        b.add_call_count(60_000, SlotType::Error, 1);

        a.merge(&b);
        assert_eq!(a.bucket_count(), 2);
        assert_eq!(a.get(0).unwrap().get(SlotType::Fast), 3);
        assert_eq!(a.total().error_count(), 1);
    }

    #[test]
    fn test_zero_filled() {
        let window = TimeWindow::new(
            Range::new(0, 3 * ONE_MINUTE).unwrap(),
            &FixedWindowSampler::ONE_MINUTE,
        );
        let mut series = TimeSeriesHistogram::new();
        series.add_call_count(ONE_MINUTE, SlotType::Fast, 4);

        let filled = series.zero_filled(&window);
        assert_eq!(filled.len(), 4);
        assert_eq!(filled[0].1.total_count(), 0);
        assert_eq!(filled[1].1.total_count(), 4);
    }

    #[test]
    fn test_rebucket_into_coarser_window() {
        let range = Range::new(0, 3 * ONE_HOUR).unwrap();
        let window = TimeWindow::new(range, &TimeWindowDownSampler);
        assert_eq!(window.window_slot_size(), 5 * ONE_MINUTE);

        let mut series = TimeSeriesHistogram::new();
        series.add_call_count(0, SlotType::Fast, 1);
        series.add_call_count(4 * ONE_MINUTE, SlotType::Fast, 2);
        series.add_call_count(5 * ONE_MINUTE, SlotType::Error, 1);

        let rebucketed = series.rebucket(&window);
        assert_eq!(rebucketed.bucket_count(), 2);
        assert_eq!(rebucketed.get(0).unwrap().get(SlotType::Fast), 3);
        assert_eq!(rebucketed.get(5 * ONE_MINUTE).unwrap().error_count(), 1);
        assert_eq!(rebucketed.total(), series.total());
        assert_eq!(rebucketed.zero_filled(&window).len(), 37);
    }
}
