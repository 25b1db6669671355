//! Outcome notifier: turns one finished match into one paced delivery job.

use std::sync::Arc;

use async_trait::async_trait;

use herald_common::directory::RecipientDirectory;
use herald_common::handler::OutcomeHandler;
use herald_common::types::{GameOutcomeEvent, Recipient};

use crate::batcher::{Deliverable, DeliveryBatcher, DeliverySummary, NotificationJob, Pacing};
use crate::payload::{self, PayloadContext};

pub struct OutcomeNotifier {
    directory: Arc<dyn RecipientDirectory>,
    batcher: Arc<DeliveryBatcher>,
    ctx: PayloadContext,
    pacing: Pacing,
}

impl OutcomeNotifier {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        batcher: Arc<DeliveryBatcher>,
        ctx: PayloadContext,
        pacing: Pacing,
    ) -> Self {
        Self {
            directory,
            batcher,
            ctx,
            pacing,
        }
    }

    /// Resolve the participants of `event` and deliver win/loss notifications.
    ///
    /// The winner is notified first; everyone else follows in chain order.
    pub async fn notify(&self, event: &GameOutcomeEvent) -> DeliverySummary {
        let recipients = self.resolve(event).await;

        let ctx = self.ctx.clone();
        let framed = event.clone();
        let job = NotificationJob {
            label: format!("{}:{}", event.kind, event.match_id),
            recipients,
            builder: Box::new(move |recipient: &Recipient| {
                payload::outcome_payload(&ctx, &framed, recipient)
            }),
            pacing: self.pacing,
        };

        self.batcher.run(job).await
    }

    async fn resolve(&self, event: &GameOutcomeEvent) -> Vec<Deliverable> {
        let mut resolved = Vec::new();

        for address in event.winner_first() {
            let recipient = match self.directory.get_by_address(&address).await {
                Ok(Some(recipient)) => recipient,
                Ok(None) => {
                    tracing::debug!(match_id = event.match_id, address = %address, "Participant not registered");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        match_id = event.match_id,
                        address = %address,
                        error = %e,
                        "Recipient lookup failed, skipping participant"
                    );
                    continue;
                }
            };

            if !recipient.notifications_enabled {
                tracing::debug!(recipient_id = recipient.id, "Recipient opted out of notifications");
                continue;
            }
            if event.kind.is_battle_royale() && !recipient.battle_royale_notifications_enabled {
                tracing::debug!(recipient_id = recipient.id, "Recipient opted out of battle royale notifications");
                continue;
            }

            let recipient_id = recipient.id;
            match Deliverable::new(recipient) {
                Some(deliverable) => resolved.push(deliverable),
                None => {
                    tracing::debug!(recipient_id, "Recipient has no delivery credentials");
                }
            }
        }

        resolved
    }
}

#[async_trait]
impl OutcomeHandler for OutcomeNotifier {
    async fn handle(&self, event: GameOutcomeEvent) {
        let summary = self.notify(&event).await;
        tracing::info!(
            match_id = event.match_id,
            kind = %event.kind,
            sent = summary.sent,
            failed = summary.failed,
            "Outcome notifications processed"
        );
    }
}
