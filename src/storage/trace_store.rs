use dashmap::DashMap;
use fxhash::FxHashSet;
use parking_lot::RwLock;

use super::agent::StaticAgentInfoService;
use super::dao::{
    AgentInfo, AgentInfoService, ApplicationTraceIndexDao, LimitedScanResult, SelectedScatterArea,
    StorageError, TraceDao,
};
use crate::trace::{Span, TransactionId};
use crate::window::Range;

/// One row of the application trace index
#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceIndexEntry {
    accept_time: i64,
    elapsed: i32,
    transaction_id: TransactionId,
}

/// In-memory trace store
///
/// Spans are grouped by transaction; every span also adds a row to the
/// index of its application so trace ids can be scanned by time.
pub struct MemoryTraceStore {
    transactions: DashMap<TransactionId, Vec<Span>>,
    /// Rows per application, kept sorted by accept time
    index: DashMap<String, RwLock<Vec<TraceIndexEntry>>>,
    agents: StaticAgentInfoService,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
            index: DashMap::new(),
            agents: StaticAgentInfoService::new(),
        }
    }

    /// Store a batch of spans. The batch is validated before anything is written.
    pub fn insert_spans(&self, spans: Vec<Span>) -> Result<usize, StorageError> {
        for span in &spans {
            validate_span(span)?;
        }

        let inserted = spans.len();
        for span in spans {
            self.index_span(&span);
            self.agents.register(AgentInfo {
                agent_id: span.agent_id.clone(),
                application_name: span.application_id.clone(),
                hostname: String::new(),
                ip: span.end_point.clone().unwrap_or_default(),
                service_type: span.service_type,
                start_timestamp: span.transaction_id.agent_start_time.min(span.start_time),
            });
            self.transactions
                .entry(span.transaction_id.clone())
                .or_default()
                .push(span);
        }

        tracing::debug!("Stored {} spans", inserted);
        Ok(inserted)
    }

    fn index_span(&self, span: &Span) {
        let entry = TraceIndexEntry {
            accept_time: span.collector_accept_time,
            elapsed: span.elapsed,
            transaction_id: span.transaction_id.clone(),
        };
        let rows = self.index.entry(span.application_id.clone()).or_default();
        let mut rows = rows.write();
        let pos = rows.partition_point(|r| r.accept_time <= entry.accept_time);
        rows.insert(pos, entry);
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn span_count(&self) -> usize {
        self.transactions.iter().map(|t| t.value().len()).sum()
    }

    /// Agents seen in stored spans
    pub fn agent_info(&self) -> &StaticAgentInfoService {
        &self.agents
    }

    /// Scan one application's index newest first, keeping distinct
    /// transactions accepted by `predicate`
    fn scan<F>(
        &self,
        application_name: &str,
        limit: usize,
        predicate: F,
    ) -> LimitedScanResult<Vec<TransactionId>>
    where
        F: Fn(&TraceIndexEntry) -> bool,
    {
        let Some(rows) = self.index.get(application_name) else {
            return LimitedScanResult::complete(Vec::new());
        };
        let rows = rows.read();

        let mut seen: FxHashSet<&TransactionId> = FxHashSet::default();
        let mut scan_data = Vec::new();
        let mut last_time = None;

        for row in rows.iter().rev().filter(|r| predicate(r)) {
            if !seen.insert(&row.transaction_id) {
                continue;
            }
            if scan_data.len() == limit {
                let time = last_time.unwrap_or(row.accept_time);
                return LimitedScanResult::limited(scan_data, time);
            }
            scan_data.push(row.transaction_id.clone());
            last_time = Some(row.accept_time);
        }

        LimitedScanResult::complete(scan_data)
    }
}

impl Default for MemoryTraceStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_span(span: &Span) -> Result<(), StorageError> {
    if span.application_id.is_empty() {
        return Err(StorageError::InvalidSpan(format!(
            "span {} of {} has no application id",
            span.span_id, span.transaction_id
        )));
    }
    if span.agent_id.is_empty() {
        return Err(StorageError::InvalidSpan(format!(
            "span {} of {} has no agent id",
            span.span_id, span.transaction_id
        )));
    }
    Ok(())
}

impl TraceDao for MemoryTraceStore {
    fn select_all_spans(
        &self,
        transaction_ids: &[TransactionId],
    ) -> Result<Vec<Vec<Span>>, StorageError> {
        Ok(transaction_ids
            .iter()
            .map(|id| {
                self.transactions
                    .get(id)
                    .map(|spans| spans.value().clone())
                    .unwrap_or_default()
            })
            .collect())
    }
}

impl AgentInfoService for MemoryTraceStore {
    fn agents_of(&self, application_name: &str, range: Range) -> Vec<AgentInfo> {
        self.agents.agents_of(application_name, range)
    }
}

impl ApplicationTraceIndexDao for MemoryTraceStore {
    fn scan_trace_index(
        &self,
        application_name: &str,
        range: Range,
        limit: usize,
    ) -> Result<LimitedScanResult<Vec<TransactionId>>, StorageError> {
        Ok(self.scan(application_name, limit, |row| {
            range.contains(row.accept_time)
        }))
    }

    fn scan_trace_index_area(
        &self,
        application_name: &str,
        area: SelectedScatterArea,
        limit: usize,
    ) -> Result<LimitedScanResult<Vec<TransactionId>>, StorageError> {
        Ok(self.scan(application_name, limit, |row| {
            area.contains(row.accept_time, row.elapsed)
        }))
    }
}
