//! Stored span data model

use serde::{Deserialize, Serialize};

use super::transaction::TransactionId;
use crate::schema::ServiceTypeCode;

/// One traced unit of work inside a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub transaction_id: TransactionId,
    /// Unique within the transaction only
    pub span_id: i64,
    /// `None` for the root span
    #[serde(default)]
    pub parent_span_id: Option<i64>,
    /// Logical application name
    pub application_id: String,
    pub service_type: ServiceTypeCode,
    pub agent_id: String,
    /// Start time in milliseconds since epoch
    pub start_time: i64,
    /// Duration in milliseconds
    pub elapsed: i32,
    /// Time the collector received the span
    pub collector_accept_time: i64,
    /// 0 when the span completed without error
    #[serde(default)]
    pub err_code: i32,
    /// Request URI handled by this span
    #[serde(default)]
    pub rpc: Option<String>,
    /// Address the request was received on
    #[serde(default)]
    pub end_point: Option<String>,
    /// Caller address as seen by this span
    #[serde(default)]
    pub remote_addr: Option<String>,
    #[serde(default)]
    pub span_events: Vec<SpanEvent>,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn has_error(&self) -> bool {
        self.err_code != 0
    }
}

/// A sub-call recorded inside a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEvent {
    #[serde(default)]
    pub sequence: i16,
    /// Offset from the owning span's start time
    pub start_elapsed: i32,
    /// Duration of the call
    pub end_elapsed: i32,
    pub service_type: ServiceTypeCode,
    /// Callee name: application, database or host
    pub destination_id: String,
    /// Peer address
    #[serde(default)]
    pub end_point: Option<String>,
    /// Span id the callee reported for this call, if any
    #[serde(default)]
    pub next_span_id: Option<i64>,
    #[serde(default)]
    pub has_exception: bool,
    #[serde(default)]
    pub rpc: Option<String>,
}

/// Builder helpers for constructing spans by hand
impl Span {
    pub fn new(
        transaction_id: TransactionId,
        span_id: i64,
        application_id: impl Into<String>,
        service_type: ServiceTypeCode,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            span_id,
            parent_span_id: None,
            application_id: application_id.into(),
            service_type,
            agent_id: agent_id.into(),
            start_time: 0,
            elapsed: 0,
            collector_accept_time: 0,
            err_code: 0,
            rpc: None,
            end_point: None,
            remote_addr: None,
            span_events: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_span_id: i64) -> Self {
        self.parent_span_id = Some(parent_span_id);
        self
    }

    /// Set start time and elapsed; the collector accept time follows the end of the span
    pub fn with_timing(mut self, start_time: i64, elapsed: i32) -> Self {
        self.start_time = start_time;
        self.elapsed = elapsed;
        self.collector_accept_time = start_time.saturating_add(elapsed as i64);
        self
    }

    pub fn with_accept_time(mut self, collector_accept_time: i64) -> Self {
        self.collector_accept_time = collector_accept_time;
        self
    }

    pub fn with_err_code(mut self, err_code: i32) -> Self {
        self.err_code = err_code;
        self
    }

    pub fn with_rpc(mut self, rpc: impl Into<String>) -> Self {
        self.rpc = Some(rpc.into());
        self
    }

    pub fn with_event(mut self, event: SpanEvent) -> Self {
        self.span_events.push(event);
        self
    }
}

impl SpanEvent {
    pub fn new(service_type: ServiceTypeCode, destination_id: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            start_elapsed: 0,
            end_elapsed: 0,
            service_type,
            destination_id: destination_id.into(),
            end_point: None,
            next_span_id: None,
            has_exception: false,
            rpc: None,
        }
    }

    pub fn with_timing(mut self, start_elapsed: i32, end_elapsed: i32) -> Self {
        self.start_elapsed = start_elapsed;
        self.end_elapsed = end_elapsed;
        self
    }

    pub fn with_end_point(mut self, end_point: impl Into<String>) -> Self {
        self.end_point = Some(end_point.into());
        self
    }

    pub fn with_next_span_id(mut self, next_span_id: i64) -> Self {
        self.next_span_id = Some(next_span_id);
        self
    }

    pub fn with_exception(mut self, has_exception: bool) -> Self {
        self.has_exception = has_exception;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_root_and_error() {
        let tx = TransactionId::new("agent", 1, 1);
        let root = Span::new(tx.clone(), 1, "web", 1010, "agent");
        assert!(root.is_root());
        assert!(!root.has_error());

        let child = Span::new(tx, 2, "api", 1010, "agent-2")
            .with_parent(1)
            .with_err_code(500);
        assert!(!child.is_root());
        assert!(child.has_error());
    }

    #[test]
    fn test_span_json_defaults() {
        let json = r#"{
            "transactionId": "web-1^1000^1",
            "spanId": 10,
            "applicationId": "web",
            "serviceType": 1010,
            "agentId": "web-1",
            "startTime": 2000,
            "elapsed": 50,
            "collectorAcceptTime": 2050,
            "spanEvents": [{
                "startElapsed": 5,
                "endElapsed": 20,
                "serviceType": 2101,
                "destinationId": "orders-db"
            }]
        }"#;

        let span: Span = serde_json::from_str(json).unwrap();
        assert!(span.is_root());
        assert_eq!(span.err_code, 0);
        assert_eq!(span.transaction_id.sequence, 1);
        assert_eq!(span.span_events.len(), 1);
        assert_eq!(span.span_events[0].next_span_id, None);
        assert!(!span.span_events[0].has_exception);
    }

    #[test]
    fn test_with_timing_sets_accept_time() {
        let span = Span::new(TransactionId::new("a", 1, 1), 1, "web", 1010, "a")
            .with_timing(1_000, 250);
        assert_eq!(span.collector_accept_time, 1_250);
    }
}
