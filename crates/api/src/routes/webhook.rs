//! Registration webhook: the client platform reports app installs and
//! notification opt-ins/outs here.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use herald_common::error::AppError;
use herald_decoders::normalize::normalize_registration;
use herald_engine::registration::apply_registration;

use crate::middleware::auth::TriggerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhook/recipients", post(receive_registration))
}

/// POST /api/webhook/recipients: Accepts any of the known event shapes.
async fn receive_registration(
    State(state): State<AppState>,
    _auth: TriggerAuth,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let event = normalize_registration(&body)?;
    let recipient_id = event.recipient_id();
    apply_registration(state.directory.as_ref(), event).await?;

    Ok(Json(json!({
        "applied": true,
        "recipient_id": recipient_id,
    })))
}
