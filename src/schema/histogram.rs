//! Latency histogram schemas
//!
//! A schema is an ordered set of latency slots (each with an inclusive upper
//! bound, the last one unbounded) plus a distinguished error slot.

use serde::Serialize;

/// Latency slot kinds, ordered from fastest to error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotType {
    Fast,
    Normal,
    Slow,
    VerySlow,
    Error,
}

impl SlotType {
    pub const ALL: [SlotType; 5] = [
        SlotType::Fast,
        SlotType::Normal,
        SlotType::Slow,
        SlotType::VerySlow,
        SlotType::Error,
    ];
}

/// One latency bucket of a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramSlot {
    pub slot_type: SlotType,
    /// Inclusive upper bound in milliseconds; `None` for the catch-all and error slots
    pub upper_bound: Option<u32>,
    pub label: &'static str,
}

impl HistogramSlot {
    pub const fn new(slot_type: SlotType, upper_bound: Option<u32>, label: &'static str) -> Self {
        Self {
            slot_type,
            upper_bound,
            label,
        }
    }

    fn accepts(&self, elapsed: i64) -> bool {
        match self.upper_bound {
            Some(bound) => elapsed <= bound as i64,
            None => true,
        }
    }
}

/// Ordered latency slots for a family of service types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramSchema {
    code: i32,
    slots: [HistogramSlot; 4],
    error_slot: HistogramSlot,
}

/// Schema for fast backends (caches, databases)
pub static FAST_SCHEMA: HistogramSchema = HistogramSchema::new(
    1,
    [
        HistogramSlot::new(SlotType::Fast, Some(100), "100ms"),
        HistogramSlot::new(SlotType::Normal, Some(300), "300ms"),
        HistogramSlot::new(SlotType::Slow, Some(500), "500ms"),
        HistogramSlot::new(SlotType::VerySlow, None, "Slow"),
    ],
    "Error",
);

/// Schema for application servers and remote calls
pub static NORMAL_SCHEMA: HistogramSchema = HistogramSchema::new(
    2,
    [
        HistogramSlot::new(SlotType::Fast, Some(1000), "1s"),
        HistogramSlot::new(SlotType::Normal, Some(3000), "3s"),
        HistogramSlot::new(SlotType::Slow, Some(5000), "5s"),
        HistogramSlot::new(SlotType::VerySlow, None, "Slow"),
    ],
    "Error",
);

impl HistogramSchema {
    /// Build a schema from four latency slots ordered by ascending bound.
    /// The last slot is treated as unbounded regardless of its declared bound.
    pub const fn new(code: i32, slots: [HistogramSlot; 4], error_label: &'static str) -> Self {
        let mut slots = slots;
        slots[3].upper_bound = None;
        Self {
            code,
            slots,
            error_slot: HistogramSlot::new(SlotType::Error, None, error_label),
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    /// Latency slots in schema order
    pub fn slots(&self) -> &[HistogramSlot] {
        &self.slots
    }

    pub fn error_slot(&self) -> &HistogramSlot {
        &self.error_slot
    }

    /// First slot whose upper bound is >= elapsed; the last slot catches the rest
    pub fn find_histogram_slot(&self, elapsed: i32) -> &HistogramSlot {
        let elapsed = elapsed.max(0) as i64;
        self.slots
            .iter()
            .find(|slot| slot.accepts(elapsed))
            .unwrap_or(&self.slots[3])
    }

    /// Classify one call: errors go to the error slot regardless of latency
    pub fn slot_for(&self, has_exception: bool, elapsed: i32) -> &HistogramSlot {
        if has_exception {
            &self.error_slot
        } else {
            self.find_histogram_slot(elapsed)
        }
    }

    /// Label for a slot type in this schema
    pub fn label(&self, slot_type: SlotType) -> &'static str {
        match slot_type {
            SlotType::Error => self.error_slot.label,
            other => self
                .slots
                .iter()
                .find(|s| s.slot_type == other)
                .map(|s| s.label)
                .unwrap_or("Unknown"),
        }
    }
}
