use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

use servermap::map::{ExecutionMode, FilteredMapService, MapConfig, MapRequest};
use servermap::schema::{codes, StaticServiceTypeRegistry};
use servermap::storage::MemoryTraceStore;
use servermap::trace::{Span, SpanEvent, TransactionId};
use servermap::window::Range;

const SERVICES: &[&str] = &["gateway", "orders", "billing", "inventory", "auth", "search"];
const DATABASES: &[&str] = &["orders-db", "billing-db", "session-cache"];
const AGENTS_PER_SERVICE: usize = 3;

/// One call tree: a root service fanning out to a few downstream services,
/// each of which may hit a database
fn generate_transaction(seq: i64, now: i64, rng: &mut StdRng) -> Vec<Span> {
    let root = SERVICES[rng.gen_range(0..SERVICES.len())];
    let root_agent = format!("{}-{}", root, rng.gen_range(0..AGENTS_PER_SERVICE));
    let tx = TransactionId::new(root_agent.clone(), now - 3_600_000, seq);
    let start = now - rng.gen_range(0..3_600_000);
    let root_elapsed = rng.gen_range(20..4_000);

    let mut root_span = Span::new(tx.clone(), 1, root, codes::TOMCAT, root_agent)
        .with_timing(start, root_elapsed)
        .with_rpc(format!("/{}/{}", root, rng.gen_range(0..50)));
    if rng.gen_bool(0.02) {
        root_span = root_span.with_err_code(1);
    }

    let mut spans = Vec::new();
    let mut next_span_id = 2;
    for _ in 0..rng.gen_range(0..4) {
        let callee = SERVICES[rng.gen_range(0..SERVICES.len())];
        let callee_agent = format!("{}-{}", callee, rng.gen_range(0..AGENTS_PER_SERVICE));
        let offset = rng.gen_range(0..root_elapsed / 2);
        let elapsed = rng.gen_range(1..root_elapsed - offset);
        // some callees never report their span
        let reported = rng.gen_bool(0.9);

        root_span = root_span.with_event(
            SpanEvent::new(codes::HTTP_CLIENT, callee)
                .with_timing(offset, elapsed)
                .with_end_point(format!("{}:8080", callee))
                .with_next_span_id(next_span_id),
        );
        if reported {
            let mut child = Span::new(tx.clone(), next_span_id, callee, codes::TOMCAT, callee_agent)
                .with_parent(1)
                .with_timing(start + offset as i64, elapsed);
            if rng.gen_bool(0.5) {
                let db = DATABASES[rng.gen_range(0..DATABASES.len())];
                child = child.with_event(
                    SpanEvent::new(codes::MYSQL_EXECUTE_QUERY, db)
                        .with_timing(0, rng.gen_range(0..elapsed.max(1)))
                        .with_end_point(format!("{}:3306", db))
                        .with_exception(rng.gen_bool(0.01)),
                );
            }
            spans.push(child);
        }
        next_span_id += 1;
    }

    spans.push(root_span);
    spans
}

fn percentile(latencies: &[Duration], pct: usize) -> Duration {
    let mut sorted = latencies.to_vec();
    sorted.sort();
    sorted
        .get(sorted.len() * pct / 100)
        .or(sorted.last())
        .copied()
        .unwrap_or_default()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let transactions: i64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(20_000);
    let iterations: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(5);

    let now = chrono::Utc::now().timestamp_millis();
    let range = Range::new(now - 3_600_000, now)?;

    println!("servermap benchmark");
    println!("===================");
    println!("Transactions:  {}", transactions);
    println!("Iterations:    {}", iterations);
    println!("CPU cores:     {}", num_cpus::get());
    println!("Range:         {}", range);
    println!();

    let store = Arc::new(MemoryTraceStore::new());
    let mut rng = StdRng::seed_from_u64(12345);
    let mut ids = Vec::with_capacity(transactions as usize);
    let load_start = Instant::now();
    for seq in 0..transactions {
        let spans = generate_transaction(seq, now, &mut rng);
        if let Some(span) = spans.first() {
            ids.push(span.transaction_id.clone());
        }
        store.insert_spans(spans)?;
    }
    println!(
        "Loaded {} spans in {:?}",
        store.span_count(),
        load_start.elapsed()
    );
    println!();

    let registry = Arc::new(StaticServiceTypeRegistry::with_defaults());
    for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel] {
        let service = FilteredMapService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            registry.clone(),
        )
        .with_config(
            MapConfig::default()
                .with_execution_mode(mode)
                .with_parallel_threshold(1),
        );

        let mut latencies = Vec::with_capacity(iterations);
        let mut summary = (0, 0);
        for _ in 0..iterations {
            let started = Instant::now();
            let map = service.select_application_map(MapRequest::new(ids.clone(), range))?;
            latencies.push(started.elapsed());
            summary = (map.nodes().len(), map.links().len());
        }

        let total: Duration = latencies.iter().sum();
        println!("{} mode", mode);
        println!("  Map:         {} nodes, {} links", summary.0, summary.1);
        println!(
            "  Tx/sec:      {:.0}",
            (transactions as f64 * iterations as f64) / total.as_secs_f64()
        );
        println!(
            "  Latency:     p50={:?} p99={:?} max={:?}",
            percentile(&latencies, 50),
            percentile(&latencies, 99),
            latencies.iter().max().copied().unwrap_or_default()
        );
        println!();
    }

    Ok(())
}
