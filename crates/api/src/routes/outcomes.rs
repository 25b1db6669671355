//! Outcome replay: lets an external indexer push completion events that the
//! live subscription missed (e.g. while the ingestor was stopped).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use herald_common::error::AppError;
use herald_common::types::OutcomeFamily;
use herald_decoders::normalize::normalize_outcome;

use crate::middleware::auth::TriggerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/outcomes/{family}", post(replay_outcome))
}

/// POST /api/outcomes/{family}: `family` is `duel` or `battle_royale`.
/// Notification ids are derived from the match, so replaying an event the
/// endpoint already saw is deduplicated downstream.
async fn replay_outcome(
    State(state): State<AppState>,
    _auth: TriggerAuth,
    Path(family): Path<OutcomeFamily>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let raw = normalize_outcome(family, &body)?;
    let match_id = raw.match_id;
    state.ingestor.ingest(raw);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "accepted": true,
            "family": family,
            "match_id": match_id,
        })),
    ))
}
