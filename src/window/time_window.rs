//! Fixed-width time bucketing over a reporting range
//!
//! The bucket width is picked by a sampler from the length of the range so
//! that long ranges produce a bounded number of buckets.

use super::range::Range;

pub const ONE_MINUTE: i64 = 60 * 1000;
pub const ONE_HOUR: i64 = 60 * ONE_MINUTE;
pub const SIX_HOURS: i64 = 6 * ONE_HOUR;
pub const TWELVE_HOURS: i64 = 12 * ONE_HOUR;
pub const ONE_DAY: i64 = 24 * ONE_HOUR;
pub const TWO_DAYS: i64 = 2 * ONE_DAY;

/// Picks a bucket width for a range
pub trait TimeWindowSampler: Send + Sync {
    fn window_size(&self, range: &Range) -> i64;
}

/// Coarser buckets for longer ranges
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindowDownSampler;

impl TimeWindowSampler for TimeWindowDownSampler {
    fn window_size(&self, range: &Range) -> i64 {
        let diff = range.range();
        if diff <= ONE_HOUR {
            ONE_MINUTE
        } else if diff <= SIX_HOURS {
            ONE_MINUTE * 5
        } else if diff <= TWELVE_HOURS {
            ONE_MINUTE * 10
        } else if diff <= ONE_DAY {
            ONE_MINUTE * 20
        } else if diff <= TWO_DAYS {
            ONE_MINUTE * 30
        } else {
            ONE_HOUR
        }
    }
}

/// Same bucket width regardless of range
#[derive(Debug, Clone, Copy)]
pub struct FixedWindowSampler(pub i64);

impl FixedWindowSampler {
    pub const ONE_MINUTE: FixedWindowSampler = FixedWindowSampler(ONE_MINUTE);
}

impl TimeWindowSampler for FixedWindowSampler {
    fn window_size(&self, _range: &Range) -> i64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    range: Range,
    window_slot_size: i64,
}

impl TimeWindow {
    pub fn new(range: Range, sampler: &dyn TimeWindowSampler) -> Self {
        Self {
            range,
            window_slot_size: sampler.window_size(&range).max(1),
        }
    }

    /// Bucket start for a timestamp. Timestamps outside the range are clamped
    /// to the first or last bucket.
    pub fn refine_timestamp(&self, timestamp: i64) -> i64 {
        let start = self.range.from();
        let clamped = timestamp.clamp(start, self.range.to());
        start + ((clamped - start) / self.window_slot_size) * self.window_slot_size
    }

    pub fn window_slot_size(&self) -> i64 {
        self.window_slot_size
    }

    /// Range spanning the first and last bucket starts
    pub fn window_range(&self) -> Range {
        let last = self.refine_timestamp(self.range.to());
        // refine never goes below from, so this cannot be inverted
        Range::new(self.range.from(), last).unwrap_or(self.range)
    }

    /// Number of buckets in the window
    pub fn window_range_count(&self) -> usize {
        let window = self.window_range();
        (window.range() / self.window_slot_size) as usize + 1
    }

    /// Iterate over bucket start times
    pub fn iter(&self) -> TimeWindowIter {
        let window = self.window_range();
        TimeWindowIter {
            next: Some(window.from()),
            last: window.to(),
            step: self.window_slot_size,
        }
    }
}

impl IntoIterator for &TimeWindow {
    type Item = i64;
    type IntoIter = TimeWindowIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct TimeWindowIter {
    next: Option<i64>,
    last: i64,
    step: i64,
}

impl Iterator for TimeWindowIter {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let current = self.next.filter(|next| *next <= self.last)?;
        // stops at the end of the i64 timeline
        self.next = current.checked_add(self.step);
        Some(current)
    }
}
