//! Event ingestor: keeps one chain subscription alive and turns each
//! completion event into a `GameOutcomeEvent` for the outcome handler.
//!
//! Each event is processed in its own task, so stopping the ingestor ends the
//! subscription without cancelling deliveries that are already under way.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use herald_common::directory::RecipientDirectory;
use herald_common::error::AppError;
use herald_common::handler::OutcomeHandler;
use herald_common::types::{
    BattleRoyaleDetails, GameKind, GameOutcomeEvent, MatchRecord, OutcomeFamily,
    ParticipantRecord, RawOutcome,
};

use crate::chain::ChainClient;

/// Bounded exponential backoff for resubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based): `initial * 2^(attempt-1)`, capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Subscription state as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestorHealth {
    Stopped,
    Connecting,
    Live,
    Reconnecting { attempt: u32, retry_in_ms: u64 },
}

struct Shared {
    chain: Arc<dyn ChainClient>,
    directory: Arc<dyn RecipientDirectory>,
    handler: Arc<dyn OutcomeHandler>,
    policy: ReconnectPolicy,
    health: watch::Sender<IngestorHealth>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    listener: JoinHandle<()>,
}

pub struct EventIngestor {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl EventIngestor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        directory: Arc<dyn RecipientDirectory>,
        handler: Arc<dyn OutcomeHandler>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (health, _) = watch::channel(IngestorHealth::Stopped);
        Self {
            shared: Arc::new(Shared {
                chain,
                directory,
                handler,
                policy,
                health,
            }),
            running: Mutex::new(None),
        }
    }

    /// Start listening. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = running.as_ref()
            && !current.listener.is_finished()
        {
            tracing::debug!("Ingestor already running");
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        self.shared.health.send_replace(IngestorHealth::Connecting);
        let listener = tokio::spawn(listen(self.shared.clone(), shutdown_rx));
        *running = Some(Running { shutdown, listener });

        tracing::info!("Event ingestor started");
        true
    }

    /// Stop listening. Returns `false` if not running.
    ///
    /// Events already handed off keep processing.
    pub fn stop(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let Some(current) = running.take() else {
            return false;
        };
        let was_live = !current.listener.is_finished();
        let _ = current.shutdown.send(true);
        self.shared.health.send_replace(IngestorHealth::Stopped);

        tracing::info!("Event ingestor stopped");
        was_live
    }

    /// Process an outcome that did not arrive over the subscription, such as
    /// a replay posted by an external indexer. Works whether or not the
    /// listener is running.
    pub fn ingest(&self, raw: RawOutcome) {
        tracing::info!(match_id = raw.match_id, family = %raw.family, "Ingesting replayed outcome");
        tokio::spawn(process(self.shared.clone(), raw));
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.listener.is_finished())
    }

    pub fn health(&self) -> IngestorHealth {
        self.shared.health.borrow().clone()
    }

    pub fn watch_health(&self) -> watch::Receiver<IngestorHealth> {
        self.shared.health.subscribe()
    }
}

impl Drop for EventIngestor {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock()
            && let Some(current) = running.take()
        {
            let _ = current.shutdown.send(true);
        }
    }
}

async fn listen(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        let subscribed = tokio::select! {
            result = shared.chain.subscribe() => result,
            _ = shutdown.changed() => return,
        };

        match subscribed {
            Ok(mut events) => {
                attempt = 0;
                if !publish(&shared.health, &shutdown, IngestorHealth::Live) {
                    return;
                }
                tracing::info!("Listening for game outcomes");

                loop {
                    tokio::select! {
                        received = events.recv() => match received {
                            Some(raw) => {
                                tokio::spawn(process(shared.clone(), raw));
                            }
                            None => {
                                tracing::warn!("Outcome subscription dropped");
                                break;
                            }
                        },
                        _ = shutdown.changed() => return,
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, "Failed to subscribe to game outcomes");
            }
        }

        attempt = attempt.saturating_add(1);
        let delay = shared.policy.delay(attempt);
        let reconnecting = IngestorHealth::Reconnecting {
            attempt,
            retry_in_ms: delay.as_millis() as u64,
        };
        if !publish(&shared.health, &shutdown, reconnecting) {
            return;
        }
        tracing::info!(attempt, retry_in_ms = delay.as_millis() as u64, "Resubscribing after backoff");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Publish `next` unless shutdown was signalled. The flag is read under the
/// health lock, so a concurrent `stop()` always writes `Stopped` last.
/// Returns whether the listener should keep going.
fn publish(
    health: &watch::Sender<IngestorHealth>,
    shutdown: &watch::Receiver<bool>,
    next: IngestorHealth,
) -> bool {
    health.send_if_modified(|current| {
        if *shutdown.borrow() {
            return false;
        }
        *current = next;
        true
    });
    !*shutdown.borrow()
}

/// Enrich and hand off one event. Failures are logged and dropped.
async fn process(shared: Arc<Shared>, raw: RawOutcome) {
    let match_id = raw.match_id;
    let family = raw.family;

    match enrich(&shared, raw).await {
        Ok(event) => shared.handler.handle(event).await,
        Err(e) => {
            tracing::warn!(match_id, %family, error = %e, "Dropping outcome event");
        }
    }
}

async fn enrich(shared: &Arc<Shared>, raw: RawOutcome) -> Result<GameOutcomeEvent, AppError> {
    match raw.family {
        OutcomeFamily::Duel => {
            let participants = shared.chain.duel_participants(raw.match_id).await?;
            Ok(GameOutcomeEvent::new(
                raw.match_id,
                GameKind::Duel,
                &raw.winner_address,
                raw.prize_amount,
                participants,
            ))
        }
        OutcomeFamily::BattleRoyale => {
            let details = shared.chain.battle_royale(raw.match_id).await?;
            let event = GameOutcomeEvent::new(
                raw.match_id,
                details.kind,
                &raw.winner_address,
                raw.prize_amount,
                &details.participants,
            );

            tokio::spawn(record_battle_royale(
                shared.directory.clone(),
                event.clone(),
                details,
            ));
            Ok(event)
        }
    }
}

/// Persist match history. Runs detached; delivery never waits on it.
async fn record_battle_royale(
    directory: Arc<dyn RecipientDirectory>,
    event: GameOutcomeEvent,
    details: BattleRoyaleDetails,
) {
    let Ok(match_id) = i64::try_from(event.match_id) else {
        tracing::error!(match_id = event.match_id, "Match id out of range, history not recorded");
        return;
    };

    let record = MatchRecord {
        match_id,
        kind: event.kind,
        winner_address: event.winner_address.clone(),
        prize_amount: event.prize_amount.clone(),
        bet_amount: details.bet_amount,
        participant_count: i32::try_from(event.participant_addresses.len()).unwrap_or(i32::MAX),
        started_at: details.started_at,
        completed_at: Utc::now(),
    };
    if let Err(e) = directory.create_match_record(&record).await {
        tracing::error!(match_id, error = %e, "Failed to record battle royale");
        return;
    }

    for address in &event.participant_addresses {
        let recipient_id = match directory.get_by_address(address).await {
            Ok(found) => found.map(|r| r.id),
            Err(e) => {
                tracing::warn!(match_id, address = %address, error = %e, "Recipient lookup failed");
                None
            }
        };
        let is_winner = event.is_winner(address);
        let participant = ParticipantRecord {
            match_id,
            kind: event.kind,
            wallet_address: address.clone(),
            recipient_id,
            is_winner,
            payout: if is_winner {
                event.prize_amount.clone()
            } else {
                "0".to_string()
            },
        };
        if let Err(e) = directory.add_participant_record(&participant).await {
            tracing::error!(match_id, address = %address, error = %e, "Failed to record participant");
        }
    }

    tracing::debug!(match_id, participants = event.participant_addresses.len(), "Battle royale recorded");
}
