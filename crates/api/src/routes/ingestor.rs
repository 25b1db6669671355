//! Ingestor lifecycle routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::middleware::auth::TriggerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ingestor/start", post(start))
        .route("/api/ingestor/stop", post(stop))
        .route("/api/ingestor/status", get(status))
}

/// POST /api/ingestor/start: `started` is false if it was already running.
async fn start(State(state): State<AppState>, _auth: TriggerAuth) -> Json<serde_json::Value> {
    let started = state.ingestor.start();
    Json(json!({
        "started": started,
        "running": state.ingestor.is_running(),
    }))
}

/// POST /api/ingestor/stop: `stopped` is false if it was not running.
async fn stop(State(state): State<AppState>, _auth: TriggerAuth) -> Json<serde_json::Value> {
    let stopped = state.ingestor.stop();
    Json(json!({
        "stopped": stopped,
        "running": state.ingestor.is_running(),
    }))
}

/// GET /api/ingestor/status
async fn status(State(state): State<AppState>, _auth: TriggerAuth) -> Json<serde_json::Value> {
    Json(json!({
        "running": state.ingestor.is_running(),
        "health": state.ingestor.health(),
    }))
}
