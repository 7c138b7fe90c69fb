//! Application map construction
//!
//! Transactions flow through `TransactionAggregator` into `MapStatistics`,
//! which `ApplicationMapBuilder` freezes into an `ApplicationMap`.
//! `FilteredMapService` is the request-level entry point.

pub mod application;
pub mod application_map;
pub mod builder;
pub mod config;
pub mod error;
pub mod scatter;
pub mod service;
pub mod statistics;

pub use application::Application;
pub use application_map::{ApplicationMap, ApplicationMapBuilder, Link, Node};
pub use builder::TransactionAggregator;
pub use config::{ExecutionMode, MapConfig};
pub use error::MapError;
pub use scatter::{ApplicationScatterScanResult, Dot, DotExtractor};
pub use service::{FilteredMapService, MapRequest};
pub use statistics::{MapSample, MapStatistics};
