//! Transaction selection predicates
//!
//! A filter sees one whole transaction and decides whether it takes part in
//! map construction. Filters are built per request from short-key JSON
//! descriptors.

pub mod descriptor;
pub mod from_to;
pub mod url;

pub use descriptor::{FilterBuilder, FilterDescriptor, ResponseBound};
pub use from_to::FromToResponseFilter;
pub use url::UrlPatternFilter;

use crate::trace::Span;

pub trait Filter: Send + Sync {
    /// Whether the transaction is kept
    fn include(&self, transaction: &[Span]) -> bool;
}

/// Keeps every transaction
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl Filter for AcceptAllFilter {
    fn include(&self, _transaction: &[Span]) -> bool {
        true
    }
}

pub static NONE: AcceptAllFilter = AcceptAllFilter;

/// Logical AND of filters; an empty chain keeps everything
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for FilterChain {
    fn include(&self, transaction: &[Span]) -> bool {
        self.filters.iter().all(|f| f.include(transaction))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Malformed filter descriptor: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing filter field: {0}")]
    MissingField(&'static str),

    #[error("Unknown service type: {0}")]
    UnknownServiceType(String),

    #[error("Invalid response range: {from} > {to}")]
    InvalidResponseRange { from: i64, to: i64 },

    #[error("Invalid response bound: {0}")]
    InvalidResponseBound(String),

    #[error("Invalid url pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
