//! Paced delivery of one notification job.
//!
//! Recipients are sent sequentially in fixed-size batches. Inside a batch the
//! worker waits `item_delay` between sends; between batches it waits
//! `batch_delay`. Neither delay follows the final send of the job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use herald_common::directory::RecipientDirectory;
use herald_common::types::{DeliveryTarget, NotificationPayload, Recipient};
use herald_notifier::NotificationTransport;

/// Rate-limit settings for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub batch_size: usize,
    pub item_delay: Duration,
    pub batch_delay: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            batch_size: 50,
            item_delay: Duration::from_millis(200),
            batch_delay: Duration::from_secs(5),
        }
    }
}

impl Pacing {
    pub fn from_config(config: &herald_common::config::AppConfig) -> Self {
        Self {
            batch_size: config.delivery_batch_size.max(1),
            item_delay: Duration::from_millis(config.delivery_item_delay_ms),
            batch_delay: Duration::from_millis(config.delivery_batch_delay_ms),
        }
    }
}

/// A recipient paired with credentials already checked to be complete.
#[derive(Debug, Clone)]
pub struct Deliverable {
    pub recipient: Recipient,
    pub target: DeliveryTarget,
}

impl Deliverable {
    /// `None` when the recipient lacks an endpoint or token.
    pub fn new(recipient: Recipient) -> Option<Self> {
        let target = recipient.delivery_target()?;
        Some(Self { recipient, target })
    }
}

pub type PayloadBuilder = Box<dyn Fn(&Recipient) -> NotificationPayload + Send + Sync>;

/// Ephemeral unit of work handed to the batcher.
pub struct NotificationJob {
    /// Shows up in logs, e.g. `duel:12`.
    pub label: String,
    pub recipients: Vec<Deliverable>,
    pub builder: PayloadBuilder,
    pub pacing: Pacing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliverySummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub batches: usize,
}

/// Sizes of consecutive batches for `len` recipients.
///
/// `plan_batches(120, 50)` is `[50, 50, 20]`; an empty job has no batches.
pub fn plan_batches(len: usize, batch_size: usize) -> Vec<usize> {
    let batch_size = batch_size.max(1);
    let mut sizes = Vec::with_capacity(len.div_ceil(batch_size));
    let mut remaining = len;
    while remaining > 0 {
        let size = remaining.min(batch_size);
        sizes.push(size);
        remaining -= size;
    }
    sizes
}

pub struct DeliveryBatcher {
    transport: Arc<dyn NotificationTransport>,
    directory: Arc<dyn RecipientDirectory>,
}

impl DeliveryBatcher {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        Self {
            transport,
            directory,
        }
    }

    /// Deliver every recipient of `job`. A failed send never stops the job.
    pub async fn run(&self, job: NotificationJob) -> DeliverySummary {
        let mut summary = DeliverySummary::default();
        if job.recipients.is_empty() {
            tracing::debug!(job = %job.label, "No recipients to notify");
            return summary;
        }

        let batches = plan_batches(job.recipients.len(), job.pacing.batch_size);
        tracing::info!(
            job = %job.label,
            recipients = job.recipients.len(),
            batches = batches.len(),
            "Delivering notification job"
        );

        let mut remaining = job.recipients.iter();
        for (batch_index, size) in batches.iter().enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(job.pacing.batch_delay).await;
            }

            for item_index in 0..*size {
                let Some(deliverable) = remaining.next() else {
                    break;
                };
                if item_index > 0 {
                    tokio::time::sleep(job.pacing.item_delay).await;
                }
                self.deliver_one(&job, deliverable, &mut summary).await;
            }
            summary.batches += 1;
        }

        tracing::info!(
            job = %job.label,
            attempted = summary.attempted,
            sent = summary.sent,
            failed = summary.failed,
            "Notification job finished"
        );
        summary
    }

    async fn deliver_one(
        &self,
        job: &NotificationJob,
        deliverable: &Deliverable,
        summary: &mut DeliverySummary,
    ) {
        let recipient_id = deliverable.recipient.id;
        let payload = (job.builder)(&deliverable.recipient);

        summary.attempted += 1;
        match self
            .transport
            .deliver(recipient_id, &deliverable.target, &payload)
            .await
        {
            Ok(()) => {
                summary.sent += 1;
                tracing::debug!(job = %job.label, recipient_id, "Notification delivered");
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(job = %job.label, recipient_id, error = %e, "Notification delivery failed");
            }
        }

        if let Err(e) = self.directory.mark_attempted(recipient_id, Utc::now()).await {
            tracing::warn!(recipient_id, error = %e, "Failed to record notification attempt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::EmbeddedDirectory;
    use crate::testing::{RecordingTransport, recipient};
    use tokio::time::Instant;

    fn payload_for(r: &Recipient) -> NotificationPayload {
        NotificationPayload {
            notification_id: format!("test:{}", r.id),
            title: "t".to_string(),
            body: "b".to_string(),
            target_url: "https://arena.example".to_string(),
        }
    }

    async fn setup(
        count: i64,
        transport: RecordingTransport,
    ) -> (Arc<RecordingTransport>, Arc<EmbeddedDirectory>, Vec<Deliverable>) {
        let directory = Arc::new(EmbeddedDirectory::in_memory());
        let mut deliverables = Vec::new();
        for id in 1..=count {
            let r = recipient(id, &format!("0x{:04x}", id));
            directory.upsert(&r).await.unwrap();
            deliverables.push(Deliverable::new(r).unwrap());
        }
        (Arc::new(transport), directory, deliverables)
    }

    #[test]
    fn test_plan_batches() {
        assert_eq!(plan_batches(120, 50), vec![50, 50, 20]);
        assert_eq!(plan_batches(50, 50), vec![50]);
        assert_eq!(plan_batches(1, 50), vec![1]);
        assert!(plan_batches(0, 50).is_empty());
        assert_eq!(plan_batches(3, 0), vec![1, 1, 1]);
    }

    #[test]
    fn test_deliverable_requires_credentials() {
        let mut r = recipient(1, "0x1");
        r.delivery_endpoint = None;
        assert!(Deliverable::new(r).is_none());
        assert!(Deliverable::new(recipient(2, "0x2")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_delay_only_between_batches() {
        let (transport, directory, recipients) =
            setup(120, RecordingTransport::default()).await;
        let batcher = DeliveryBatcher::new(transport.clone(), directory);

        let start = Instant::now();
        let summary = batcher
            .run(NotificationJob {
                label: "test".to_string(),
                recipients,
                builder: Box::new(payload_for),
                pacing: Pacing {
                    batch_size: 50,
                    item_delay: Duration::ZERO,
                    batch_delay: Duration::from_secs(5),
                },
            })
            .await;

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.sent, 120);
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        let sent = transport.sent();
        assert_eq!(sent[49].at.duration_since(start), Duration::ZERO);
        assert_eq!(sent[50].at.duration_since(start), Duration::from_secs(5));
        assert_eq!(sent[100].at.duration_since(start), Duration::from_secs(10));
        assert_eq!(sent[119].at.duration_since(start), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_delay_not_after_last_send() {
        let (transport, directory, recipients) = setup(3, RecordingTransport::default()).await;
        let batcher = DeliveryBatcher::new(transport.clone(), directory);

        let start = Instant::now();
        batcher
            .run(NotificationJob {
                label: "test".to_string(),
                recipients,
                builder: Box::new(payload_for),
                pacing: Pacing::default(),
            })
            .await;

        assert_eq!(start.elapsed(), Duration::from_millis(400));
        assert_eq!(transport.recipient_ids(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_isolated() {
        let (transport, directory, recipients) =
            setup(10, RecordingTransport::failing_for([7])).await;
        let batcher = DeliveryBatcher::new(transport.clone(), directory.clone());

        let summary = batcher
            .run(NotificationJob {
                label: "test".to_string(),
                recipients,
                builder: Box::new(payload_for),
                pacing: Pacing::default(),
            })
            .await;

        assert_eq!(
            summary,
            DeliverySummary {
                attempted: 10,
                sent: 9,
                failed: 1,
                batches: 1,
            }
        );
        assert_eq!(transport.recipient_ids(), (1..=10).collect::<Vec<_>>());

        // Attempts are recorded even when the send failed.
        let failed = directory.get_by_id(7).await.unwrap().unwrap();
        assert!(failed.last_notified_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_job_sends_nothing() {
        let (transport, directory, _) = setup(0, RecordingTransport::default()).await;
        let batcher = DeliveryBatcher::new(transport.clone(), directory);

        let summary = batcher
            .run(NotificationJob {
                label: "empty".to_string(),
                recipients: Vec::new(),
                builder: Box::new(payload_for),
                pacing: Pacing::default(),
            })
            .await;

        assert_eq!(summary, DeliverySummary::default());
        assert!(transport.sent().is_empty());
    }
}
