//! Scatter points: one dot per span, grouped by application

use serde::Serialize;
use std::collections::BTreeMap;

use super::application::Application;
use crate::trace::{Span, TransactionId};
use crate::window::Range;

/// One point on the response-time scatter chart
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dot {
    pub accepted_time: i64,
    pub elapsed_time: i32,
    pub transaction_id: TransactionId,
    pub agent_id: String,
    /// 1 when the span failed, 0 otherwise
    pub exception_code: i32,
}

impl Dot {
    pub fn from_span(span: &Span) -> Self {
        Self {
            accepted_time: span.collector_accept_time,
            elapsed_time: span.elapsed,
            transaction_id: span.transaction_id.clone(),
            agent_id: span.agent_id.clone(),
            exception_code: i32::from(span.has_error()),
        }
    }

    pub fn is_exception(&self) -> bool {
        self.exception_code != 0
    }
}

/// Dots of one application within the scan range
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationScatterScanResult {
    pub application: Application,
    pub from: i64,
    pub to: i64,
    pub dots: Vec<Dot>,
}

/// Collects dots for spans accepted within the scan range
#[derive(Debug, Clone)]
pub struct DotExtractor {
    scan_range: Range,
    dots: BTreeMap<Application, Vec<Dot>>,
}

impl DotExtractor {
    pub fn new(scan_range: Range) -> Self {
        Self {
            scan_range,
            dots: BTreeMap::new(),
        }
    }

    pub fn scan_range(&self) -> Range {
        self.scan_range
    }

    /// Returns false when the dot falls outside the scan range
    pub fn add_dot(&mut self, application: Application, dot: Dot) -> bool {
        if !self.scan_range.contains(dot.accepted_time) {
            return false;
        }
        self.dots.entry(application).or_default().push(dot);
        true
    }

    pub fn merge(&mut self, other: DotExtractor) {
        for (application, dots) in other.dots {
            self.dots.entry(application).or_default().extend(dots);
        }
    }

    pub fn dot_count(&self) -> usize {
        self.dots.values().map(|d| d.len()).sum()
    }

    /// Dots per application, ordered by accept time
    pub fn into_results(self) -> Vec<ApplicationScatterScanResult> {
        let (from, to) = (self.scan_range.from(), self.scan_range.to());
        self.dots
            .into_iter()
            .map(|(application, mut dots)| {
                dots.sort();
                ApplicationScatterScanResult {
                    application,
                    from,
                    to,
                    dots,
                }
            })
            .collect()
    }
}
