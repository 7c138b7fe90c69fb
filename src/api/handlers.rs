use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::filter::{FilterBuilder, FilterDescriptor};
use crate::map::{ApplicationMap, FilteredMapService, MapConfig, MapError, MapRequest};
use crate::schema::ServiceTypeRegistry;
use crate::storage::{LimitedScanResult, MemoryTraceStore, SelectedScatterArea, StorageError};
use crate::trace::{Span, TransactionId};
use crate::window::Range;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<FilteredMapService>,
    pub store: Arc<MemoryTraceStore>,
    pub filter_builder: FilterBuilder,
}

impl AppState {
    /// Wire a map service over an in-memory store
    pub fn new(
        store: Arc<MemoryTraceStore>,
        registry: Arc<dyn ServiceTypeRegistry>,
        config: MapConfig,
    ) -> Self {
        let service = FilteredMapService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            registry.clone(),
        )
        .with_config(config);
        Self {
            service: Arc::new(service),
            store,
            filter_builder: FilterBuilder::new(registry),
        }
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Span loading
// ============================================================================

#[derive(Serialize)]
pub struct InsertSpansResponse {
    pub inserted: usize,
    pub transactions: usize,
}

pub async fn insert_spans(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<Span>>, JsonRejection>,
) -> Result<Json<InsertSpansResponse>, ApiError> {
    let Json(spans) = payload?;
    let inserted = state.store.insert_spans(spans)?;

    Ok(Json(InsertSpansResponse {
        inserted,
        transactions: state.store.transaction_count(),
    }))
}

// ============================================================================
// Application map
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapQuery {
    pub transaction_ids: Option<Vec<TransactionId>>,
    pub original_range: Option<Range>,
    #[serde(default)]
    pub scan_range: Option<Range>,
    #[serde(default)]
    pub filter: Vec<FilterDescriptor>,
}

pub async fn application_map(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MapQuery>, JsonRejection>,
) -> Result<Json<ApplicationMap>, ApiError> {
    let Json(query) = payload?;
    let filter = state
        .filter_builder
        .build(&query.filter)
        .map_err(MapError::from)?;

    let request = MapRequest {
        transaction_ids: query.transaction_ids,
        original_range: query.original_range,
        scan_range: query.scan_range,
        filter: Some(filter),
    };

    let service = Arc::clone(&state.service);
    let map = tokio::task::spawn_blocking(move || service.select_application_map(request))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(map))
}

pub async fn transaction_map(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApplicationMap>, ApiError> {
    let transaction_id = id
        .parse::<TransactionId>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let service = Arc::clone(&state.service);
    let map = tokio::task::spawn_blocking(move || {
        service.select_application_map_for_transaction(&transaction_id)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(map))
}

// ============================================================================
// Trace id lookup
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceIdsQuery {
    pub application: String,
    #[serde(default)]
    pub range: Option<Range>,
    /// Scatter chart selection; takes precedence over `range`
    #[serde(default)]
    pub area: Option<SelectedScatterArea>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn trace_ids(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TraceIdsQuery>, JsonRejection>,
) -> Result<Json<LimitedScanResult<Vec<TransactionId>>>, ApiError> {
    let Json(query) = payload?;
    let limit = query.limit.unwrap_or(state.service.config().scan_limit);

    let result = match (query.area, query.range) {
        (Some(area), _) => state
            .service
            .select_trace_ids_from_scatter_area(&query.application, area, limit)?,
        (None, Some(range)) => state
            .service
            .select_trace_ids_from_application_trace_index(&query.application, range, limit)?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either range or area is required".to_string(),
            ))
        }
    };

    Ok(Json(result))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub transactions: usize,
    pub spans: usize,
    pub applications: usize,
    pub execution_mode: String,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        transactions: state.store.transaction_count(),
        spans: state.store.span_count(),
        applications: state.store.agent_info().application_count(),
        execution_mode: state.service.config().execution_mode.to_string(),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<MapError> for ApiError {
    fn from(err: MapError) -> Self {
        match err {
            MapError::InvalidArgument(_) => ApiError::BadRequest(err.to_string()),
            MapError::TransactionNotFound(_) => ApiError::NotFound(err.to_string()),
            MapError::Storage(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidSpan(_) => ApiError::BadRequest(err.to_string()),
            StorageError::Unavailable(_) => {
                tracing::error!("Storage failure: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_reports_version() {
        let Json(health) = tokio_test::block_on(health_check());
        assert_eq!(health.status, "healthy");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (
                ApiError::from(MapError::invalid("limit must be greater than 0")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(MapError::TransactionNotFound(TransactionId::new("a", 1, 2))),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(MapError::Storage(StorageError::Unavailable(
                    "down".to_string(),
                ))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(StorageError::InvalidSpan("missing agentId".to_string())),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
