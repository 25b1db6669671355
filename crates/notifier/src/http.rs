//! HTTP delivery to a push notification endpoint.
//!
//! Each recipient registers its own endpoint URL and token. The request body
//! carries the notification id so the endpoint can drop duplicates:
//!
//! ```json
//! { "notificationId": "...", "title": "...", "body": "...",
//!   "targetUrl": "...", "tokens": ["..."] }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use herald_common::types::{DeliveryTarget, NotificationPayload};

use crate::transport::{DeliveryFailed, NotificationTransport};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendNotificationRequest<'a> {
    notification_id: &'a str,
    title: &'a str,
    body: &'a str,
    target_url: &'a str,
    tokens: [&'a str; 1],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendNotificationResult {
    #[serde(default)]
    successful_tokens: Vec<String>,
    #[serde(default)]
    invalid_tokens: Vec<String>,
    #[serde(default)]
    rate_limited_tokens: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SendNotificationResponse {
    result: SendNotificationResult,
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    async fn deliver(
        &self,
        recipient_id: i64,
        target: &DeliveryTarget,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryFailed> {
        let request = SendNotificationRequest {
            notification_id: &payload.notification_id,
            title: &payload.title,
            body: &payload.body,
            target_url: &payload.target_url,
            tokens: [target.token()],
        };

        let response = self
            .client
            .post(target.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| DeliveryFailed::new(recipient_id, format!("request error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeliveryFailed::new(
                recipient_id,
                format!("endpoint returned {}: {}", status, detail.trim()),
            ));
        }

        // Endpoints that report per-token results may accept the request and
        // still refuse this token.
        let body = response.bytes().await.unwrap_or_default();
        if let Ok(parsed) = serde_json::from_slice::<SendNotificationResponse>(&body) {
            let token = target.token().to_string();
            if parsed.result.invalid_tokens.contains(&token) {
                return Err(DeliveryFailed::new(recipient_id, "token rejected as invalid"));
            }
            if parsed.result.rate_limited_tokens.contains(&token) {
                return Err(DeliveryFailed::new(recipient_id, "token rate limited"));
            }
            tracing::debug!(
                recipient_id,
                successful = parsed.result.successful_tokens.len(),
                notification_id = %payload.notification_id,
                "Notification accepted"
            );
        }

        Ok(())
    }
}
