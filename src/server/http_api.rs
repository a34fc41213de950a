//! HTTP front end for the cache.
//!
//! Routes:
//! - GET /health
//! - GET /metrics
//! - GET /v1/cache/stats
//! - GET | PUT | DELETE /v1/cache/entries/{key}
//! - GET /v1/cache/entries/{key}/events
//! - DELETE /v1/cache/tags/{tag}
//! - POST /v1/cache/sweep
//! - POST /v1/cache/clear

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::{CacheEngine, CacheError, GetOptions, Lookup, PriorityClass, SetOptions, StatsSnapshot};
use crate::metrics::CacheMetrics;
use crate::server::events::key_event_stream;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: Arc<CacheEngine>,
    pub metrics: CacheMetrics,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/cache/stats", get(cache_stats))
        .route(
            "/v1/cache/entries/{key}",
            get(get_entry).put(put_entry).delete(delete_entry),
        )
        .route("/v1/cache/entries/{key}/events", get(entry_events))
        .route("/v1/cache/tags/{tag}", delete(delete_tag))
        .route("/v1/cache/sweep", post(sweep))
        .route("/v1/cache/clear", post(clear))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct GetEntryParams {
    #[serde(default)]
    pub force_fresh: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntryResponse {
    pub key: String,
    pub value: Value,
}

/// Body of `PUT /v1/cache/entries/{key}`.
#[derive(Debug, Deserialize)]
pub struct PutEntryRequest {
    pub value: Value,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub priority: PriorityClass,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub compress: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    pub expired: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub durable: bool,
    pub cache: StatsSnapshot,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        durable: state.engine.is_durable(),
        cache: state.engine.stats().await,
    })
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.engine.stats().await)
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    state.metrics.observe(&state.engine.stats().await);
    state.metrics.render().map_err(|e| {
        warn!(error = %e, "Failed to render metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<GetEntryParams>,
) -> Result<Json<EntryResponse>, StatusCode> {
    let options = GetOptions {
        force_fresh: params.force_fresh,
    };
    match state.engine.get_with(&key, options).await {
        Lookup::Hit(value) => Ok(Json(EntryResponse { key, value })),
        Lookup::Miss => Err(StatusCode::NOT_FOUND),
    }
}

async fn put_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(req): Json<PutEntryRequest>,
) -> impl IntoResponse {
    let options = SetOptions {
        ttl: req.ttl_secs.map(Duration::from_secs),
        priority: req.priority,
        tags: req.tags,
        compress: req.compress,
    };

    match state.engine.set(&key, req.value, options).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e @ CacheError::CapacityExhausted { .. }) => (
            StatusCode::INSUFFICIENT_STORAGE,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> StatusCode {
    state.engine.delete(&key).await;
    StatusCode::NO_CONTENT
}

async fn delete_tag(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Json<DeletedResponse> {
    let deleted = state.engine.delete_by_tag(&tag).await;
    Json(DeletedResponse { deleted })
}

async fn entry_events(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    info!(key = %key, "Event stream opened");
    let stream = key_event_stream(&state.engine, key);
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn sweep(State(state): State<Arc<AppState>>) -> Json<SweepResponse> {
    let expired = state.engine.sweep().await;
    Json(SweepResponse { expired })
}

async fn clear(State(state): State<Arc<AppState>>) -> StatusCode {
    state.engine.clear().await;
    StatusCode::NO_CONTENT
}
