//! Map construction entry points
//!
//! `FilteredMapService` owns the collaborators and runs the request pipeline:
//! validate, dedup ids, fetch transactions, apply the filter, aggregate and
//! assemble.

use std::slice;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::application_map::{ApplicationMap, ApplicationMapBuilder};
use super::builder::TransactionAggregator;
use super::config::MapConfig;
use super::error::MapError;
use crate::filter::{self, Filter};
use crate::schema::ServiceTypeRegistry;
use crate::storage::{
    AgentInfoService, ApplicationTraceIndexDao, LimitedScanResult, SelectedScatterArea, TraceDao,
};
use crate::trace::{dedup_transaction_ids, Span, TransactionId};
use crate::window::Range;

/// Arguments of a filtered map request. Every field except `scan_range` is
/// required; `scan_range` falls back to `original_range`.
#[derive(Default)]
pub struct MapRequest {
    pub transaction_ids: Option<Vec<TransactionId>>,
    /// Reporting range the time windows are laid over
    pub original_range: Option<Range>,
    /// Range dots are extracted from
    pub scan_range: Option<Range>,
    pub filter: Option<Box<dyn Filter>>,
}

impl MapRequest {
    pub fn new(transaction_ids: Vec<TransactionId>, range: Range) -> Self {
        Self {
            transaction_ids: Some(transaction_ids),
            original_range: Some(range),
            scan_range: None,
            filter: Some(Box::new(filter::AcceptAllFilter)),
        }
    }

    pub fn with_scan_range(mut self, scan_range: Range) -> Self {
        self.scan_range = Some(scan_range);
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.filter = Some(filter);
        self
    }
}

pub struct FilteredMapService {
    trace_dao: Arc<dyn TraceDao>,
    trace_index_dao: Arc<dyn ApplicationTraceIndexDao>,
    agent_info_service: Arc<dyn AgentInfoService>,
    registry: Arc<dyn ServiceTypeRegistry>,
    config: MapConfig,
}

impl FilteredMapService {
    pub fn new(
        trace_dao: Arc<dyn TraceDao>,
        trace_index_dao: Arc<dyn ApplicationTraceIndexDao>,
        agent_info_service: Arc<dyn AgentInfoService>,
        registry: Arc<dyn ServiceTypeRegistry>,
    ) -> Self {
        Self {
            trace_dao,
            trace_index_dao,
            agent_info_service,
            registry,
            config: MapConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MapConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn ServiceTypeRegistry> {
        &self.registry
    }

    /// Build the map of every requested transaction accepted by the filter
    pub fn select_application_map(&self, request: MapRequest) -> Result<ApplicationMap, MapError> {
        let transaction_ids = request
            .transaction_ids
            .ok_or_else(|| MapError::invalid("transactionIdList must not be null"))?;
        let original_range = request
            .original_range
            .ok_or_else(|| MapError::invalid("originalRange must not be null"))?;
        let scan_range = request.scan_range.unwrap_or(original_range);
        let filter = request
            .filter
            .ok_or_else(|| MapError::invalid("filter must not be null"))?;

        let started = Instant::now();
        let transaction_ids = dedup_transaction_ids(&transaction_ids);
        let transactions = self.trace_dao.select_all_spans(&transaction_ids)?;
        let fetched = transactions.len();

        let selected: Vec<Vec<Span>> = transactions
            .into_iter()
            .filter(|transaction| !transaction.is_empty() && filter.include(transaction))
            .collect();

        let map = self.build_map(&selected, original_range, scan_range);
        debug!(
            "Map built in {:?}. transactions:{} selected:{} nodes:{} links:{}",
            started.elapsed(),
            fetched,
            selected.len(),
            map.nodes().len(),
            map.links().len()
        );
        Ok(map)
    }

    /// Map of a single transaction over the time its spans cover
    pub fn select_application_map_for_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<ApplicationMap, MapError> {
        let spans = self
            .trace_dao
            .select_all_spans(slice::from_ref(transaction_id))?
            .into_iter()
            .next()
            .unwrap_or_default();

        let range = Range::covering(
            spans
                .iter()
                .flat_map(|span| [span.start_time, span.collector_accept_time]),
        )
        .ok_or_else(|| MapError::TransactionNotFound(transaction_id.clone()))?;

        info!(
            "Transaction map. transactionId:{} spans:{} range:{}",
            transaction_id,
            spans.len(),
            range
        );
        Ok(self.build_map(&[spans], range, range))
    }

    pub fn select_trace_ids_from_application_trace_index(
        &self,
        application_name: &str,
        range: Range,
        limit: usize,
    ) -> Result<LimitedScanResult<Vec<TransactionId>>, MapError> {
        validate_scan(application_name, limit)?;
        let result = self
            .trace_index_dao
            .scan_trace_index(application_name, range, limit)?;
        debug!(
            "Trace index scan. application:{} range:{} found:{} limited:{}",
            application_name,
            range,
            result.scan_data.len(),
            result.is_limited()
        );
        Ok(result)
    }

    pub fn select_trace_ids_from_scatter_area(
        &self,
        application_name: &str,
        area: SelectedScatterArea,
        limit: usize,
    ) -> Result<LimitedScanResult<Vec<TransactionId>>, MapError> {
        validate_scan(application_name, limit)?;
        let result = self
            .trace_index_dao
            .scan_trace_index_area(application_name, area, limit)?;
        debug!(
            "Scatter area scan. application:{} found:{} limited:{}",
            application_name,
            result.scan_data.len(),
            result.is_limited()
        );
        Ok(result)
    }

    fn build_map(
        &self,
        transactions: &[Vec<Span>],
        original_range: Range,
        scan_range: Range,
    ) -> ApplicationMap {
        let mode = self.config.mode_for(transactions.len());
        let statistics = TransactionAggregator::new(self.registry.as_ref(), original_range)
            .aggregate(transactions, scan_range, mode);
        let (link_data_duplex_map, response_histogram, dot_extractor) = statistics.into_parts();

        ApplicationMapBuilder::new(original_range)
            .build(
                &link_data_duplex_map,
                &response_histogram.build(),
                self.agent_info_service.as_ref(),
            )
            .with_scatter(dot_extractor.into_results())
    }
}

fn validate_scan(application_name: &str, limit: usize) -> Result<(), MapError> {
    if application_name.trim().is_empty() {
        return Err(MapError::invalid("applicationName must not be empty"));
    }
    if limit == 0 {
        return Err(MapError::invalid("limit must be greater than 0"));
    }
    Ok(())
}
