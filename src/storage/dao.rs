//! Storage collaborator interfaces
//!
//! The map engine only reads through these traits. Durable backends live
//! outside this crate; `MemoryTraceStore` is the in-process implementation.

use serde::{Deserialize, Serialize};

use crate::trace::{Span, TransactionId};
use crate::window::Range;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid span: {0}")]
    InvalidSpan(String),
}

/// Result of a scan that may have stopped at a row limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitedScanResult<T> {
    pub scan_data: T,
    /// Accept time of the last row returned when the limit cut the scan short
    pub limited_time: Option<i64>,
}

impl<T> LimitedScanResult<T> {
    pub fn complete(scan_data: T) -> Self {
        Self {
            scan_data,
            limited_time: None,
        }
    }

    pub fn limited(scan_data: T, limited_time: i64) -> Self {
        Self {
            scan_data,
            limited_time: Some(limited_time),
        }
    }

    pub fn is_limited(&self) -> bool {
        self.limited_time.is_some()
    }
}

/// Rectangle selected on a scatter chart: accept time by response time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedScatterArea {
    pub time_range: Range,
    pub response_min: i32,
    pub response_max: i32,
}

impl SelectedScatterArea {
    pub fn contains(&self, accept_time: i64, elapsed: i32) -> bool {
        self.time_range.contains(accept_time)
            && elapsed >= self.response_min
            && elapsed <= self.response_max
    }
}

/// Fetches whole transactions
pub trait TraceDao: Send + Sync {
    /// One inner vector per requested id, in request order. Unknown ids yield
    /// an empty transaction.
    fn select_all_spans(
        &self,
        transaction_ids: &[TransactionId],
    ) -> Result<Vec<Vec<Span>>, StorageError>;
}

/// Per-application index of transactions by accept time
pub trait ApplicationTraceIndexDao: Send + Sync {
    /// Newest first, at most `limit` distinct transactions
    fn scan_trace_index(
        &self,
        application_name: &str,
        range: Range,
        limit: usize,
    ) -> Result<LimitedScanResult<Vec<TransactionId>>, StorageError>;

    fn scan_trace_index_area(
        &self,
        application_name: &str,
        area: SelectedScatterArea,
        limit: usize,
    ) -> Result<LimitedScanResult<Vec<TransactionId>>, StorageError>;
}

/// Instrumented process metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_id: String,
    pub application_name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ip: String,
    pub service_type: i16,
    /// Agent start time, epoch milliseconds
    pub start_timestamp: i64,
}

/// Agent lookup used to decorate map nodes
pub trait AgentInfoService: Send + Sync {
    /// Agents of an application that were started before the end of the range
    fn agents_of(&self, application_name: &str, range: Range) -> Vec<AgentInfo>;
}
