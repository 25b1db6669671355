//! Shared fixtures for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use herald_common::types::{DeliveryTarget, NotificationPayload, Recipient};
use herald_notifier::{DeliveryFailed, NotificationTransport};

/// An enabled recipient with complete delivery credentials.
pub fn recipient(id: i64, address: &str) -> Recipient {
    Recipient {
        id,
        wallet_address: address.to_ascii_lowercase(),
        display_name: format!("player{}", id),
        delivery_endpoint: Some("https://push.example/notify".to_string()),
        delivery_token: Some(format!("tok-{}", id)),
        notifications_enabled: true,
        battle_royale_notifications_enabled: true,
        last_notified_at: None,
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub recipient_id: i64,
    pub payload: NotificationPayload,
    pub at: Instant,
}

/// Transport that records every call and fails for the configured ids.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    failing: HashSet<i64>,
}

impl RecordingTransport {
    pub fn failing_for(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: ids.into_iter().collect(),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipient_ids(&self) -> Vec<i64> {
        self.sent().iter().map(|s| s.recipient_id).collect()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn deliver(
        &self,
        recipient_id: i64,
        _target: &DeliveryTarget,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryFailed> {
        self.sent.lock().unwrap().push(Sent {
            recipient_id,
            payload: payload.clone(),
            at: Instant::now(),
        });
        if self.failing.contains(&recipient_id) {
            return Err(DeliveryFailed::new(recipient_id, "HTTP 500"));
        }
        Ok(())
    }
}
