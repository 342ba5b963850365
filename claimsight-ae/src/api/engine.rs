//! Engine control endpoints
//!
//! The dashboard drives the engine exclusively through these routes; all
//! mutation goes through the [`EngineHandle`](crate::engine::EngineHandle)
//! facade, never into engine internals.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use claimsight_common::types::EngineLogEntry;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::engine::EngineStatus;

/// POST /engine/start
///
/// Idempotent: starting a running engine only clears a stale fault flag.
pub async fn start_engine(State(state): State<AppState>) -> Json<EngineStatus> {
    info!("Engine start requested");
    state.engine.start().await;
    Json(state.engine.status())
}

/// POST /engine/stop
///
/// Idempotent; in-flight sub-batches are left to finish.
pub async fn stop_engine(State(state): State<AppState>) -> Json<EngineStatus> {
    info!("Engine stop requested");
    state.engine.stop().await;
    Json(state.engine.status())
}

/// POST /engine/toggle
pub async fn toggle_engine(State(state): State<AppState>) -> Json<EngineStatus> {
    state.engine.toggle().await;
    Json(state.engine.status())
}

/// POST /engine/cycle - run one cycle immediately
///
/// 409 when the engine is stopped or a cycle is already in flight.
pub async fn trigger_cycle(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    if !state.engine.run_cycle_now().await {
        return Err(ApiError::Conflict(
            "Engine is stopped or a cycle is already in flight".to_string(),
        ));
    }
    Ok(Json(json!({ "cycle": "completed" })))
}

/// GET /engine/status
pub async fn engine_status(State(state): State<AppState>) -> Json<EngineStatus> {
    Json(state.engine.status())
}

/// Log listing response
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub entries: Vec<EngineLogEntry>,
}

/// GET /engine/logs - bounded log snapshot, oldest first
pub async fn engine_logs(State(state): State<AppState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        entries: state.engine.logs(),
    })
}

/// POST /engine/settings/refresh - re-read the AI provider from the backend
pub async fn refresh_settings(State(state): State<AppState>) -> Json<EngineStatus> {
    info!("Settings refresh requested");
    state.engine.refresh_settings().await;
    Json(state.engine.status())
}

/// Build engine control routes
pub fn engine_routes() -> Router<AppState> {
    Router::new()
        .route("/engine/start", post(start_engine))
        .route("/engine/stop", post(stop_engine))
        .route("/engine/toggle", post(toggle_engine))
        .route("/engine/cycle", post(trigger_cycle))
        .route("/engine/status", get(engine_status))
        .route("/engine/logs", get(engine_logs))
        .route("/engine/settings/refresh", post(refresh_settings))
}
