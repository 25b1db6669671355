//! Daily reminder run.
//!
//! Everyone eligible who has not been notified yet today (UTC) gets one
//! nudge. Sends go straight to the transport with a flat delay between them;
//! only successful sends update `last_notified_at`, so a recipient whose send
//! failed is picked up again by the next run on the same day.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::Serialize;

use herald_common::directory::RecipientDirectory;
use herald_common::error::AppError;
use herald_common::types::{EligibilityFilter, NotificationPayload};
use herald_notifier::NotificationTransport;

use crate::idempotency;
use crate::payload::{self, PayloadContext};

struct ReminderTemplate {
    title: &'static str,
    body: &'static str,
}

const TEMPLATES: &[ReminderTemplate] = &[
    ReminderTemplate {
        title: "The arena is open",
        body: "Fresh opponents are waiting. Jump into a duel today!",
    },
    ReminderTemplate {
        title: "Ready for a rematch?",
        body: "Your rivals have been practicing. Show them how it's done.",
    },
    ReminderTemplate {
        title: "Battle Royale is live",
        body: "A new lobby is filling up. Be the last one standing!",
    },
    ReminderTemplate {
        title: "Daily challenge",
        body: "One match a day keeps your streak alive. Play now!",
    },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderSummary {
    pub sent: usize,
    /// Already notified today.
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
}

pub struct DailyReminderScheduler {
    directory: Arc<dyn RecipientDirectory>,
    transport: Arc<dyn NotificationTransport>,
    ctx: PayloadContext,
    delay: Duration,
}

impl DailyReminderScheduler {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        transport: Arc<dyn NotificationTransport>,
        ctx: PayloadContext,
        delay: Duration,
    ) -> Self {
        Self {
            directory,
            transport,
            ctx,
            delay,
        }
    }

    pub async fn run(&self) -> Result<ReminderSummary, AppError> {
        self.run_at(Utc::now()).await
    }

    /// Run as if the current time were `now`.
    ///
    /// Fails only if the eligible list cannot be read. Individual send
    /// failures are counted in `errors`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ReminderSummary, AppError> {
        let today = now.date_naive();
        let recipients = self
            .directory
            .list_eligible(EligibilityFilter::default())
            .await?;

        let mut summary = ReminderSummary {
            total: recipients.len(),
            ..Default::default()
        };
        tracing::info!(total = summary.total, day = %today, "Starting daily reminder run");

        let mut first_send = true;
        for recipient in &recipients {
            if recipient.notified_on(today) {
                summary.skipped += 1;
                continue;
            }
            let Some(target) = recipient.delivery_target() else {
                summary.skipped += 1;
                continue;
            };

            if !first_send {
                tokio::time::sleep(self.delay).await;
            }
            first_send = false;

            let payload = self.reminder_payload(idempotency::reminder_key(today, recipient.id));
            match self.transport.deliver(recipient.id, &target, &payload).await {
                Ok(()) => {
                    summary.sent += 1;
                    if let Err(e) = self.directory.mark_delivered(recipient.id, now).await {
                        tracing::warn!(recipient_id = recipient.id, error = %e, "Failed to record reminder delivery");
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(recipient_id = recipient.id, error = %e, "Daily reminder failed");
                }
            }
        }

        tracing::info!(
            sent = summary.sent,
            skipped = summary.skipped,
            errors = summary.errors,
            total = summary.total,
            "Daily reminder run finished"
        );
        Ok(summary)
    }

    fn reminder_payload(&self, notification_id: String) -> NotificationPayload {
        let template = pick_template();
        payload::build(
            notification_id,
            template.title,
            template.body,
            self.ctx.app_url.clone(),
        )
    }
}

fn pick_template() -> &'static ReminderTemplate {
    TEMPLATES.choose(&mut rand::rng()).unwrap_or(&TEMPLATES[0])
}
