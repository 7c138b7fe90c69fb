use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive time range in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct Range {
    from: i64,
    to: i64,
}

#[derive(Deserialize)]
struct RawRange {
    from: i64,
    to: i64,
}

impl TryFrom<RawRange> for Range {
    type Error = RangeError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Range::new(raw.from, raw.to)
    }
}

impl Range {
    pub fn new(from: i64, to: i64) -> Result<Self, RangeError> {
        if from > to {
            return Err(RangeError::Inverted { from, to });
        }
        if to.checked_sub(from).is_none() {
            return Err(RangeError::TooLong { from, to });
        }
        Ok(Self { from, to })
    }

    /// Smallest range covering every timestamp; `None` for an empty input or
    /// when the span is too long to measure
    pub fn covering<I: IntoIterator<Item = i64>>(timestamps: I) -> Option<Self> {
        let mut iter = timestamps.into_iter();
        let first = iter.next()?;
        let (from, to) = iter.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
        Self::new(from, to).ok()
    }

    pub fn from(&self) -> i64 {
        self.from
    }

    pub fn to(&self) -> i64 {
        self.to
    }

    /// Length of the range in milliseconds
    pub fn range(&self) -> i64 {
        self.to.saturating_sub(self.from)
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.from && timestamp <= self.to
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Range[{}..{}]", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Invalid range: from ({from}) is after to ({to})")]
    Inverted { from: i64, to: i64 },
    #[error("Invalid range: {from}..{to} is too long")]
    TooLong { from: i64, to: i64 },
}
