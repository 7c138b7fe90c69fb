use regex::Regex;

use super::{Filter, FilterError};
use crate::trace::Span;

/// Keeps transactions whose root span served a matching request URI
#[derive(Debug, Clone)]
pub struct UrlPatternFilter {
    pattern: Regex,
}

impl UrlPatternFilter {
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Filter for UrlPatternFilter {
    fn include(&self, transaction: &[Span]) -> bool {
        transaction
            .iter()
            .filter(|span| span.is_root())
            .filter_map(|span| span.rpc.as_deref())
            .any(|rpc| self.pattern.is_match(rpc))
    }
}
