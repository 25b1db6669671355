pub mod health;
pub mod ingestor;
pub mod outcomes;
pub mod reminders;
pub mod webhook;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(ingestor::router())
        .merge(outcomes::router())
        .merge(reminders::router())
        .merge(webhook::router())
        .with_state(state)
}
