use async_trait::async_trait;
use thiserror::Error;

use herald_common::types::{DeliveryTarget, NotificationPayload};

/// The single error surfaced by a transport: the send did not reach the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery to recipient {recipient_id} failed: {cause}")]
pub struct DeliveryFailed {
    pub recipient_id: i64,
    pub cause: String,
}

impl DeliveryFailed {
    pub fn new(recipient_id: i64, cause: impl Into<String>) -> Self {
        Self {
            recipient_id,
            cause: cause.into(),
        }
    }
}

/// Performs one outbound delivery call.
///
/// `DeliveryTarget` can only hold non-empty credentials, so callers must have
/// filtered out recipients without an endpoint or token before getting here.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn deliver(
        &self,
        recipient_id: i64,
        target: &DeliveryTarget,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryFailed>;
}
