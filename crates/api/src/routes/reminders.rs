//! Manual trigger for the daily reminder run.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use herald_common::error::AppError;
use herald_engine::reminder::ReminderSummary;

use crate::middleware::auth::TriggerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/reminders/run", post(run_reminders))
}

/// POST /api/reminders/run: Runs to completion and returns the summary.
async fn run_reminders(
    State(state): State<AppState>,
    _auth: TriggerAuth,
) -> Result<Json<ReminderSummary>, AppError> {
    tracing::info!("Daily reminder run triggered over HTTP");
    let summary = state.reminders.run().await?;
    Ok(Json(summary))
}
