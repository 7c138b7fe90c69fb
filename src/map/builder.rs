//! Per-transaction span processing
//!
//! Each span contributes a node response sample, at most one edge from its
//! parent application, one caller-side edge per recordable span event, and a
//! scatter dot. Transactions are independent, so they can be folded on worker
//! threads and the partial statistics merged.

use fxhash::FxHashMap;
use rayon::prelude::*;
use tracing::{trace, warn};

use super::application::Application;
use super::config::ExecutionMode;
use super::scatter::Dot;
use super::statistics::{MapSample, MapStatistics};
use crate::link::LinkSample;
use crate::schema::{ServiceType, ServiceTypeRegistry};
use crate::stats::{Accumulate, ResponseSample};
use crate::trace::Span;
use crate::window::{FixedWindowSampler, Range, TimeWindow, TimeWindowDownSampler};

/// Span id lookup for one transaction. A duplicated id keeps the later span.
pub(crate) fn span_lookup(transaction: &[Span]) -> FxHashMap<i64, &Span> {
    let mut spans = FxHashMap::with_capacity_and_hasher(transaction.len(), Default::default());
    for span in transaction {
        if let Some(old) = spans.insert(span.span_id, span) {
            warn!(
                "Duplicated span found. transactionId:{} spanId:{} agentId:{} application:{}",
                old.transaction_id, old.span_id, old.agent_id, old.application_id
            );
        }
    }
    spans
}

/// Turns transactions into map samples
pub struct TransactionAggregator<'a> {
    registry: &'a dyn ServiceTypeRegistry,
    /// Edge buckets, width picked from the length of the range
    link_window: TimeWindow,
    /// Node histogram buckets, always one minute wide
    response_window: TimeWindow,
}

impl<'a> TransactionAggregator<'a> {
    pub fn new(registry: &'a dyn ServiceTypeRegistry, range: Range) -> Self {
        Self {
            registry,
            link_window: TimeWindow::new(range, &TimeWindowDownSampler),
            response_window: TimeWindow::new(range, &FixedWindowSampler::ONE_MINUTE),
        }
    }

    pub fn link_window(&self) -> &TimeWindow {
        &self.link_window
    }

    pub fn response_window(&self) -> &TimeWindow {
        &self.response_window
    }

    /// Aggregate every transaction into fresh statistics
    pub fn aggregate(
        &self,
        transactions: &[Vec<Span>],
        scan_range: Range,
        mode: ExecutionMode,
    ) -> MapStatistics {
        match mode {
            ExecutionMode::Sequential => {
                let mut statistics = MapStatistics::new(scan_range);
                for transaction in transactions {
                    self.process_transaction(transaction, &mut statistics);
                }
                statistics
            }
            ExecutionMode::Parallel => transactions
                .par_iter()
                .fold(
                    || MapStatistics::new(scan_range),
                    |mut statistics, transaction| {
                        self.process_transaction(transaction, &mut statistics);
                        statistics
                    },
                )
                .reduce(
                    || MapStatistics::new(scan_range),
                    |mut left, right| {
                        left.merge(right);
                        left
                    },
                ),
        }
    }

    pub fn process_transaction<A: Accumulate<MapSample>>(
        &self,
        transaction: &[Span],
        acc: &mut A,
    ) {
        let span_map = span_lookup(transaction);
        for span in transaction {
            self.process_span(span, &span_map, acc);
        }
    }

    fn process_span<A: Accumulate<MapSample>>(
        &self,
        span: &Span,
        span_map: &FxHashMap<i64, &Span>,
        acc: &mut A,
    ) {
        let parent_application = self.parent_application(span, span_map);
        let span_application = Application::new(
            span.application_id.clone(),
            self.registry.find_service_type(span.service_type),
        );

        self.record_response_time(&span_application, span, acc);

        let service_type = span_application.service_type();
        if !service_type.is_record_statistics() || service_type.is_rpc_client() {
            warn!(
                "Invalid span application:{} transactionId:{} spanId:{}",
                span_application, span.transaction_id, span.span_id
            );
        } else {
            self.record_span_link(&parent_application, &span_application, span, acc);
        }

        self.record_span_events(&span_application, span, span_map, acc);

        acc.accumulate(MapSample::Dot {
            application: span_application,
            dot: Dot::from_span(span),
        });
    }

    /// Caller of a span: its parent span's application, or the user when the
    /// span is a root or its parent never reached storage
    fn parent_application(&self, span: &Span, span_map: &FxHashMap<i64, &Span>) -> Application {
        let parent = span
            .parent_span_id
            .and_then(|parent_id| span_map.get(&parent_id));
        match parent {
            Some(parent) => Application::new(
                parent.application_id.clone(),
                self.registry.find_service_type(parent.service_type),
            ),
            None => Application::user(span.application_id.clone()),
        }
    }

    fn record_response_time<A: Accumulate<MapSample>>(
        &self,
        application: &Application,
        span: &Span,
        acc: &mut A,
    ) {
        let slot = application
            .service_type()
            .slot_for(span.has_error(), span.elapsed)
            .slot_type;
        acc.accumulate(MapSample::Response(ResponseSample {
            application: application.clone(),
            agent_id: span.agent_id.clone(),
            timestamp: self.response_window.refine_timestamp(span.collector_accept_time),
            slot,
        }));
    }

    fn record_span_link<A: Accumulate<MapSample>>(
        &self,
        parent_application: &Application,
        span_application: &Application,
        span: &Span,
        acc: &mut A,
    ) {
        let slot = span_application
            .service_type()
            .slot_for(span.has_error(), span.elapsed)
            .slot_type;
        let sample = LinkSample {
            from: parent_application.clone(),
            from_agent: span.agent_id.clone(),
            to: span_application.clone(),
            to_agent: span.agent_id.clone(),
            timestamp: self.link_window.refine_timestamp(span.collector_accept_time),
            slot,
            count: 1,
        };

        if parent_application.service_type().is_user() {
            trace!(
                "span user:{} {} -> span:{} {}",
                parent_application,
                span.agent_id,
                span_application,
                span.agent_id
            );
            acc.accumulate(MapSample::SourceLink(sample.clone()));
        } else {
            trace!(
                "span parent:{} {} -> span:{} {}",
                parent_application,
                span.agent_id,
                span_application,
                span.agent_id
            );
        }
        acc.accumulate(MapSample::TargetLink(sample));
    }

    fn record_span_events<A: Accumulate<MapSample>>(
        &self,
        span_application: &Application,
        span: &Span,
        span_map: &FxHashMap<i64, &Span>,
        acc: &mut A,
    ) {
        for event in &span.span_events {
            let mut destination_type = self.registry.find_service_type(event.service_type);
            if !destination_type.is_record_statistics() {
                continue;
            }
            // an rpc call whose callee span is missing points at an unresolved node
            if destination_type.is_rpc_client() {
                let has_acceptor = event
                    .next_span_id
                    .is_some_and(|next| span_map.contains_key(&next));
                if !has_acceptor {
                    destination_type = ServiceType::Unknown;
                }
            }

            let destination = Application::new(event.destination_id.clone(), destination_type);
            let slot = destination
                .service_type()
                .slot_for(event.has_exception, event.end_elapsed)
                .slot_type;
            let timestamp = self
                .link_window
                .refine_timestamp(span.start_time.saturating_add(event.start_elapsed as i64));
            let destination_agent = match &event.end_point {
                Some(end_point) => end_point.clone(),
                None => {
                    warn!(
                        "Span event without end point. transactionId:{} spanId:{} destination:{}",
                        span.transaction_id, span.span_id, destination
                    );
                    String::new()
                }
            };

            trace!(
                "spanEvent src:{} {} -> dest:{} {}",
                span_application,
                span.agent_id,
                destination,
                destination_agent
            );
            acc.accumulate(MapSample::SourceLink(LinkSample {
                from: span_application.clone(),
                from_agent: span.agent_id.clone(),
                to: destination,
                to_agent: destination_agent,
                timestamp,
                slot,
                count: 1,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkKey;
    use crate::schema::{codes, ServiceTypeInfo, SlotType, StaticServiceTypeRegistry, FAST_SCHEMA};
    use crate::testing::count_warnings;
    use crate::trace::{SpanEvent, TransactionId};
    use crate::window::ONE_MINUTE;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const BASE: i64 = 1_700_000_000_000;

    fn registry() -> StaticServiceTypeRegistry {
        StaticServiceTypeRegistry::new()
            .with(ServiceTypeInfo::server(codes::TOMCAT, "TOMCAT").with_schema(FAST_SCHEMA))
            .with(ServiceTypeInfo::rpc_client(codes::HTTP_CLIENT, "HTTP_CLIENT"))
            .with(ServiceTypeInfo::terminal(codes::MYSQL, "MYSQL"))
            .with(ServiceTypeInfo::internal(codes::INTERNAL_METHOD, "INTERNAL_METHOD"))
    }

    fn range() -> Range {
        Range::new(BASE, BASE + 10 * ONE_MINUTE).unwrap()
    }

    fn tx(seq: i64) -> TransactionId {
        TransactionId::new("web-1", BASE, seq)
    }

    fn aggregate(registry: &StaticServiceTypeRegistry, transactions: &[Vec<Span>]) -> MapStatistics {
        TransactionAggregator::new(registry, range()).aggregate(transactions, range(), ExecutionMode::Sequential)
    }

    fn tomcat(registry: &StaticServiceTypeRegistry, name: &str) -> Application {
        Application::new(name, registry.find_service_type(codes::TOMCAT))
    }

    #[test]
    fn test_user_call_recorded_in_both_views() {
        let registry = registry();
        let root = Span::new(tx(1), 1, "A", codes::TOMCAT, "a-1").with_timing(BASE + 1_000, 50);
        let statistics = aggregate(&registry, &[vec![root]]);

        let key = LinkKey::new(Application::user("A"), tomcat(&registry, "A"));
        let duplex = statistics.link_data_duplex_map();
        let target = duplex.target_link_data_map().get(&key).unwrap();
        assert_eq!(target.total_count(), 1);
        assert_eq!(target.total_histogram().get(SlotType::Fast), 1);
        let call = target.call_data_for("a-1", "a-1").unwrap();
        assert_eq!(call.time_histogram().get(BASE).unwrap().get(SlotType::Fast), 1);
        assert_eq!(duplex.source_link_data_map().get(&key).unwrap().total_count(), 1);

        let summary = statistics.response_histogram().clone().build();
        let node = summary.get(&tomcat(&registry, "A")).unwrap();
        assert_eq!(node.total().get(SlotType::Fast), 1);
        assert_eq!(node.total().total_count(), 1);
    }

    #[test]
    fn test_child_span_recorded_in_target_view_only() {
        let registry = registry();
        let transaction = vec![
            Span::new(tx(1), 1, "A", codes::TOMCAT, "a-1").with_timing(BASE, 400),
            Span::new(tx(1), 2, "B", codes::TOMCAT, "b-1")
                .with_parent(1)
                .with_timing(BASE + 10, 200),
        ];
        let statistics = aggregate(&registry, &[transaction]);

        let key = LinkKey::new(tomcat(&registry, "A"), tomcat(&registry, "B"));
        let duplex = statistics.link_data_duplex_map();
        let target = duplex.target_link_data_map().get(&key).unwrap();
        assert_eq!(target.total_histogram().get(SlotType::Normal), 1);
        assert!(target.call_data_for("b-1", "b-1").is_some());
        assert!(duplex.source_link_data_map().get(&key).is_none());
    }

    #[test]
    fn test_missing_parent_falls_back_to_user() {
        let registry = registry();
        let orphan = Span::new(tx(1), 2, "B", codes::TOMCAT, "b-1")
            .with_parent(42)
            .with_timing(BASE, 10);
        let statistics = aggregate(&registry, &[vec![orphan]]);

        let key = LinkKey::new(Application::user("B"), tomcat(&registry, "B"));
        assert!(statistics
            .link_data_duplex_map()
            .target_link_data_map()
            .get(&key)
            .is_some());
    }

    #[test]
    fn test_unanswered_rpc_becomes_unknown() {
        let registry = registry();
        let span = Span::new(tx(1), 1, "A", codes::TOMCAT, "a-1")
            .with_timing(BASE, 100)
            .with_event(
                SpanEvent::new(codes::HTTP_CLIENT, "B")
                    .with_timing(5, 30)
                    .with_end_point("10.0.0.2:8080")
                    .with_next_span_id(77),
            );
        let statistics = aggregate(&registry, &[vec![span]]);

        let source = statistics.link_data_duplex_map().source_link_data_map();
        let unknown = LinkKey::new(tomcat(&registry, "A"), Application::new("B", ServiceType::Unknown));
        let declared = LinkKey::new(
            tomcat(&registry, "A"),
            Application::new("B", registry.find_service_type(codes::HTTP_CLIENT)),
        );
        let link = source.get(&unknown).unwrap();
        assert!(link.to_application().service_type().is_unknown());
        assert!(link.call_data_for("a-1", "10.0.0.2:8080").is_some());
        assert!(source.get(&declared).is_none());
    }

    #[test]
    fn test_answered_rpc_keeps_declared_type() {
        let registry = registry();
        let transaction = vec![
            Span::new(tx(1), 1, "A", codes::TOMCAT, "a-1")
                .with_timing(BASE, 100)
                .with_event(
                    SpanEvent::new(codes::HTTP_CLIENT, "B")
                        .with_timing(5, 30)
                        .with_next_span_id(2),
                ),
            Span::new(tx(1), 2, "B", codes::TOMCAT, "b-1")
                .with_parent(1)
                .with_timing(BASE + 5, 25),
        ];
        let statistics = aggregate(&registry, &[transaction]);

        let declared = LinkKey::new(
            tomcat(&registry, "A"),
            Application::new("B", registry.find_service_type(codes::HTTP_CLIENT)),
        );
        let link = statistics
            .link_data_duplex_map()
            .source_link_data_map()
            .get(&declared)
            .unwrap();
        // missing end point maps to an empty agent id
        assert!(link.call_data_for("a-1", "").is_some());
    }

    #[test]
    fn test_duplicate_span_id_keeps_later() {
        let registry = registry();
        let transaction = vec![
            Span::new(tx(1), 5, "first", codes::TOMCAT, "f-1").with_timing(BASE, 10),
            Span::new(tx(1), 5, "second", codes::TOMCAT, "s-1").with_timing(BASE, 10),
            Span::new(tx(1), 6, "child", codes::TOMCAT, "c-1")
                .with_parent(5)
                .with_timing(BASE, 10),
        ];

        let warnings = count_warnings(|| {
            let lookup = span_lookup(&transaction);
            assert_eq!(lookup.len(), 2);
            assert_eq!(lookup[&5].application_id, "second");
        });
        assert_eq!(warnings, 1);

        let statistics = aggregate(&registry, &[transaction.clone()]);
        let target = statistics.link_data_duplex_map().target_link_data_map();
        assert!(target
            .get(&LinkKey::new(tomcat(&registry, "second"), tomcat(&registry, "child")))
            .is_some());
        assert!(target
            .get(&LinkKey::new(tomcat(&registry, "first"), tomcat(&registry, "child")))
            .is_none());
    }

    #[test]
    fn test_exception_selects_error_slot() {
        let registry = registry();
        let span = Span::new(tx(1), 1, "A", codes::TOMCAT, "a-1")
            .with_timing(BASE, 5)
            .with_err_code(1)
            .with_event(
                SpanEvent::new(codes::MYSQL, "orders-db")
                    .with_timing(1, 5)
                    .with_end_point("db:3306")
                    .with_exception(true),
            );
        let statistics = aggregate(&registry, &[vec![span]]);

        let duplex = statistics.link_data_duplex_map();
        let user_edge = duplex
            .target_link_data_map()
            .get(&LinkKey::new(Application::user("A"), tomcat(&registry, "A")))
            .unwrap();
        assert_eq!(user_edge.total_histogram().error_count(), 1);
        assert_eq!(user_edge.total_histogram().get(SlotType::Fast), 0);

        let db = Application::new("orders-db", registry.find_service_type(codes::MYSQL));
        let db_edge = duplex
            .source_link_data_map()
            .get(&LinkKey::new(tomcat(&registry, "A"), db))
            .unwrap();
        assert_eq!(db_edge.total_histogram().error_count(), 1);

        let summary = statistics.response_histogram().clone().build();
        assert_eq!(
            summary.get(&tomcat(&registry, "A")).unwrap().total().error_count(),
            1
        );
    }

    #[test]
    fn test_disqualified_span_still_records_events() {
        let registry = registry();
        let span = Span::new(tx(1), 1, "A", codes::HTTP_CLIENT, "a-1")
            .with_timing(BASE, 20)
            .with_event(
                SpanEvent::new(codes::MYSQL, "orders-db")
                    .with_timing(1, 5)
                    .with_end_point("db:3306"),
            )
            .with_event(SpanEvent::new(codes::INTERNAL_METHOD, "helper").with_timing(0, 1));

        let mut statistics = MapStatistics::new(range());
        let aggregator = TransactionAggregator::new(&registry, range());
        let warnings = count_warnings(|| aggregator.process_transaction(&[span], &mut statistics));
        assert_eq!(warnings, 1);

        let duplex = statistics.link_data_duplex_map();
        assert!(duplex.target_link_data_map().is_empty());
        assert_eq!(duplex.source_link_data_map().len(), 1);
        assert_eq!(statistics.response_histogram().application_count(), 1);
    }

    #[test]
    fn test_event_timestamp_uses_span_start() {
        let registry = registry();
        let span = Span::new(tx(1), 1, "A", codes::TOMCAT, "a-1")
            .with_timing(BASE + 50_000, 20_000)
            .with_event(
                SpanEvent::new(codes::MYSQL, "orders-db")
                    .with_timing(15_000, 5)
                    .with_end_point("db:3306"),
            );
        let statistics = aggregate(&registry, &[vec![span]]);

        let db = Application::new("orders-db", registry.find_service_type(codes::MYSQL));
        let link = statistics
            .link_data_duplex_map()
            .source_link_data_map()
            .get(&LinkKey::new(tomcat(&registry, "A"), db))
            .unwrap();
        // start 50s + 15s lands in the second one-minute bucket
        assert!(link.time_histogram().get(BASE + ONE_MINUTE).is_some());
    }

    #[test]
    fn test_event_timestamp_saturates_at_timeline_end() {
        let registry = registry();
        let range = Range::new(i64::MAX - 10 * ONE_MINUTE, i64::MAX).unwrap();
        let span = Span::new(tx(1), 1, "A", codes::TOMCAT, "a-1")
            .with_timing(i64::MAX - 10, 5)
            .with_event(
                SpanEvent::new(codes::MYSQL, "orders-db")
                    .with_timing(60_000, 5)
                    .with_end_point("db:3306"),
            );
        let statistics = TransactionAggregator::new(&registry, range).aggregate(
            &[vec![span]],
            range,
            ExecutionMode::Sequential,
        );

        let db = Application::new("orders-db", registry.find_service_type(codes::MYSQL));
        let link = statistics
            .link_data_duplex_map()
            .source_link_data_map()
            .get(&LinkKey::new(tomcat(&registry, "A"), db))
            .unwrap();
        assert_eq!(link.total_count(), 1);
        assert!(link.time_histogram().get(i64::MAX).is_some());
    }

    #[test]
    fn test_dots_follow_scan_range() {
        let registry = registry();
        let inside = Span::new(tx(1), 1, "A", codes::TOMCAT, "a-1").with_timing(BASE, 10);
        let outside =
            Span::new(tx(2), 1, "A", codes::TOMCAT, "a-1").with_timing(BASE + 20 * ONE_MINUTE, 10);
        let statistics = aggregate(&registry, &[vec![inside], vec![outside]]);
        assert_eq!(statistics.dot_extractor().dot_count(), 1);
    }

    fn random_transaction(rng: &mut StdRng, seq: i64) -> Vec<Span> {
        let apps = ["web", "api", "auth", "billing"];
        let span_count = rng.gen_range(1..5);
        (0..span_count)
            .map(|i| {
                let start = BASE + rng.gen_range(0..10 * ONE_MINUTE);
                let mut span = Span::new(
                    tx(seq),
                    i as i64 + 1,
                    apps[rng.gen_range(0..apps.len())],
                    codes::TOMCAT,
                    format!("agent-{}", rng.gen_range(0..3)),
                )
                .with_timing(start, rng.gen_range(0..2_000))
                .with_err_code(if rng.gen_bool(0.1) { 1 } else { 0 });
                if i > 0 {
                    span = span.with_parent(rng.gen_range(1..=i as i64));
                }
                if rng.gen_bool(0.5) {
                    span = span.with_event(
                        SpanEvent::new(codes::MYSQL, "orders-db")
                            .with_timing(rng.gen_range(0..100), rng.gen_range(0..800))
                            .with_end_point("db:3306")
                            .with_exception(rng.gen_bool(0.05)),
                    );
                }
                if rng.gen_bool(0.3) {
                    span = span.with_event(
                        SpanEvent::new(codes::HTTP_CLIENT, apps[rng.gen_range(0..apps.len())])
                            .with_timing(rng.gen_range(0..100), rng.gen_range(0..800))
                            .with_next_span_id(rng.gen_range(1..8)),
                    );
                }
                span
            })
            .collect()
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let registry = registry();
        let mut rng = StdRng::seed_from_u64(7);
        let transactions: Vec<Vec<Span>> =
            (0..400).map(|seq| random_transaction(&mut rng, seq)).collect();

        let aggregator = TransactionAggregator::new(&registry, range());
        let (seq_links, seq_responses, seq_dots) = aggregator
            .aggregate(&transactions, range(), ExecutionMode::Sequential)
            .into_parts();
        let (par_links, par_responses, par_dots) = aggregator
            .aggregate(&transactions, range(), ExecutionMode::Parallel)
            .into_parts();

        assert_eq!(seq_links, par_links);
        assert_eq!(seq_responses.build(), par_responses.build());
        assert_eq!(seq_dots.into_results(), par_dots.into_results());
    }
}
