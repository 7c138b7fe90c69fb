//! servermap: application maps from distributed trace spans
//!
//! Turns per-transaction span records into a directed service topology
//! annotated with call counts and response-time histograms.
//!
//! # Features
//!
//! - **Link Aggregation**: caller and callee views of every edge, bucketed by time
//! - **Response Histograms**: per-application and per-agent latency slots
//! - **Service Types**: injectable registry deciding schemas and node kinds
//! - **Filters**: from/to response filters and URL patterns from JSON descriptors
//! - **Parallel Builds**: rayon fold/reduce over transactions with identical results
//! - **HTTP API**: span loading, map construction and trace id lookup
//!
//! # Example
//!
//! ```no_run
//! use servermap::map::{FilteredMapService, MapRequest};
//! use servermap::schema::{codes, StaticServiceTypeRegistry};
//! use servermap::storage::MemoryTraceStore;
//! use servermap::trace::{Span, TransactionId};
//! use servermap::window::Range;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryTraceStore::new());
//! let tx = TransactionId::new("web-1", 1_000, 1);
//! store
//!     .insert_spans(vec![Span::new(tx.clone(), 1, "web", codes::TOMCAT, "web-1")
//!         .with_timing(60_000, 45)])
//!     .unwrap();
//!
//! let registry = Arc::new(StaticServiceTypeRegistry::with_defaults());
//! let service = FilteredMapService::new(store.clone(), store.clone(), store, registry);
//! let range = Range::new(0, 600_000).unwrap();
//! let map = service.select_application_map(MapRequest::new(vec![tx], range)).unwrap();
//! println!("{}", serde_json::to_string_pretty(&map).unwrap());
//! ```

pub mod api;
pub mod filter;
pub mod link;
pub mod map;
pub mod schema;
pub mod stats;
pub mod storage;
pub mod trace;
pub mod window;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use map::{Application, ApplicationMap, FilteredMapService, MapError, MapRequest};
pub use storage::{MemoryTraceStore, StorageError};
pub use trace::{Span, SpanEvent, TransactionId};
