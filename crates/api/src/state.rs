//! Shared application state for the Axum API server.

use std::sync::Arc;

use herald_common::config::AppConfig;
use herald_common::directory::RecipientDirectory;
use herald_engine::reminder::DailyReminderScheduler;
use herald_indexer::EventIngestor;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn RecipientDirectory>,
    pub ingestor: Arc<EventIngestor>,
    pub reminders: Arc<DailyReminderScheduler>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        ingestor: Arc<EventIngestor>,
        reminders: Arc<DailyReminderScheduler>,
        config: AppConfig,
    ) -> Self {
        Self {
            directory,
            ingestor,
            reminders,
            config,
        }
    }
}
