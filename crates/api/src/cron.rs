//! In-process cron for the daily reminder run.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use herald_engine::reminder::DailyReminderScheduler;

/// Runs the reminder scheduler on a cron expression (six fields, seconds first, UTC).
pub struct ReminderCron {
    scheduler: JobScheduler,
}

impl std::fmt::Debug for ReminderCron {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderCron").finish()
    }
}

impl ReminderCron {
    /// Register the daily job and start ticking.
    pub async fn start(
        expression: &str,
        reminders: Arc<DailyReminderScheduler>,
    ) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create scheduler: {}", e))?;

        let job = CronJob::new_async(expression, move |_uuid, _lock| {
            let reminders = Arc::clone(&reminders);
            Box::pin(async move {
                match reminders.run().await {
                    Ok(summary) => {
                        tracing::info!(
                            sent = summary.sent,
                            skipped = summary.skipped,
                            errors = summary.errors,
                            "Scheduled daily reminder run finished"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Scheduled daily reminder run failed");
                    }
                }
            })
        })
        .map_err(|e| anyhow::anyhow!("Invalid REMINDER_CRON '{}': {}", expression, e))?;

        scheduler
            .add(job)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to add reminder schedule: {}", e))?;
        scheduler
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start scheduler: {}", e))?;

        tracing::info!(cron = expression, "Registered: daily reminder");
        Ok(Self { scheduler })
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to shutdown scheduler: {}", e))?;
        tracing::info!("Cron scheduler stopped");
        Ok(())
    }
}
