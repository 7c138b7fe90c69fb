//! Trace data model
//!
//! Spans are read-only inputs fetched from storage per request. A transaction
//! is the unordered set of spans sharing one `TransactionId`.

mod span;
pub mod transaction;

pub use span::{Span, SpanEvent};
pub use transaction::{dedup_transaction_ids, ParseTransactionIdError, TransactionId};
