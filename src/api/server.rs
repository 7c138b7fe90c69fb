use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    application_map, health_check, insert_spans, stats, trace_ids, transaction_map, AppState,
};
use crate::map::MapConfig;
use crate::schema::StaticServiceTypeRegistry;
use crate::storage::MemoryTraceStore;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub map: MapConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            map: MapConfig::default(),
        }
    }
}

impl ServerConfig {
    /// SERVERMAP_HOST and SERVERMAP_PORT, plus the map settings
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SERVERMAP_HOST").unwrap_or(defaults.host),
            port: std::env::var("SERVERMAP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            map: MapConfig::from_env(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        // Data loading
        .route("/spans", post(insert_spans))
        // Map construction
        .route("/map", post(application_map))
        .route("/map/transaction/:id", get(transaction_map))
        .route("/traceids", post(trace_ids))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryTraceStore::new());
    let registry = Arc::new(StaticServiceTypeRegistry::with_defaults());
    tracing::info!("Service type registry loaded: {} types", registry.len());

    let state = Arc::new(AppState::new(store, registry, config.map.clone()));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting servermap on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("servermap stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
