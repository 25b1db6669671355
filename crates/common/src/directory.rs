//! Recipient directory contract.
//!
//! The directory is the only shared mutable resource of the dispatch engine.
//! Every backend is last-writer-wins; there is no transactional coupling
//! between reading eligible recipients and writing their timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::types::{
    EligibilityFilter, MatchRecord, ParticipantRecord, Recipient, RecipientUpdate,
};

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Look up a recipient by wallet address (case-insensitive).
    async fn get_by_address(&self, address: &str) -> Result<Option<Recipient>, AppError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Recipient>, AppError>;

    /// Insert or fully replace a recipient keyed by `id`.
    async fn upsert(&self, recipient: &Recipient) -> Result<(), AppError>;

    /// Apply a partial update. Returns `NotFound` if the id is unknown.
    async fn update(&self, id: i64, update: &RecipientUpdate) -> Result<(), AppError>;

    /// All recipients passing `filter`, in the backend's stable iteration order.
    async fn list_eligible(&self, filter: EligibilityFilter) -> Result<Vec<Recipient>, AppError>;

    async fn create_match_record(&self, record: &MatchRecord) -> Result<(), AppError>;

    async fn add_participant_record(&self, record: &ParticipantRecord) -> Result<(), AppError>;

    /// Record that a send was attempted, whether or not it succeeded.
    async fn mark_attempted(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update(id, &RecipientUpdate::last_notified(at)).await
    }

    /// Record that a send succeeded.
    async fn mark_delivered(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update(id, &RecipientUpdate::last_notified(at)).await
    }
}
