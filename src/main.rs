//! servermap server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - SERVERMAP_HOST: Bind address (default: 0.0.0.0)
//! - SERVERMAP_PORT: Port number (default: 8080)
//! - SERVERMAP_EXECUTION_MODE: sequential | parallel (default: sequential)
//! - SERVERMAP_PARALLEL_THRESHOLD: Minimum transactions before a parallel build (default: 256)
//! - SERVERMAP_SCAN_LIMIT: Default trace id scan limit (default: 10000)
//! - RUST_LOG: Log level (default: servermap=info,tower_http=info)

use servermap::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "servermap=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("servermap configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Execution mode: {}", config.map.execution_mode);
    if config.map.execution_mode == servermap::map::ExecutionMode::Parallel {
        tracing::info!(
            "  Parallel threshold: {} transactions ({} cores)",
            config.map.parallel_threshold,
            num_cpus::get()
        );
    }
    tracing::info!("  Scan limit: {}", config.map.scan_limit);

    println!(
        r#"
  ___  ___ _ ____   _____ _ __ _ __ ___   __ _ _ __
 / __|/ _ \ '__\ \ / / _ \ '__| '_ ` _ \ / _` | '_ \
 \__ \  __/ |   \ V /  __/ |  | | | | | | (_| | |_) |
 |___/\___|_|    \_/ \___|_|  |_| |_| |_|\__,_| .__/
                                              |_|
 Application Map Builder for Distributed Traces
 Version: {}
 Started: {}
"#,
        env!("CARGO_PKG_VERSION"),
        chrono::Utc::now().to_rfc3339()
    );

    run_server(config).await
}
