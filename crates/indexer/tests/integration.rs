//! Lifecycle and enrichment tests for the event ingestor, driven by a
//! scripted chain client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use herald_common::directory::RecipientDirectory;
use herald_common::error::AppError;
use herald_common::handler::OutcomeHandler;
use herald_common::types::{
    BattleRoyaleDetails, EligibilityFilter, GameKind, GameOutcomeEvent, MatchRecord,
    OutcomeFamily, ParticipantRecord, RawOutcome, Recipient, RecipientUpdate,
};
use herald_engine::directory::EmbeddedDirectory;
use herald_indexer::{ChainClient, EventIngestor, IngestorHealth, ReconnectPolicy};

// ============================================================
// Shared helpers
// ============================================================

#[derive(Default)]
struct ScriptedChain {
    subscriptions: AtomicUsize,
    /// Number of `subscribe` calls that fail before one succeeds.
    failures_left: AtomicUsize,
    senders: Mutex<Vec<mpsc::Sender<RawOutcome>>>,
}

impl ScriptedChain {
    fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    async fn emit(&self, raw: RawOutcome) {
        let sender = self.senders.lock().unwrap().last().cloned();
        sender.expect("no live subscription").send(raw).await.unwrap();
    }

    /// Simulate the connection dropping.
    fn drop_connection(&self) {
        self.senders.lock().unwrap().clear();
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn subscribe(&self) -> Result<mpsc::Receiver<RawOutcome>, AppError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::Rpc("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().unwrap().push(tx);
        Ok(rx)
    }

    async fn duel_participants(&self, _match_id: u64) -> Result<Vec<String>, AppError> {
        Ok(vec!["0xP1".to_string(), "0xP2".to_string()])
    }

    async fn battle_royale(&self, match_id: u64) -> Result<BattleRoyaleDetails, AppError> {
        if match_id == 404 {
            return Err(AppError::Rpc("execution reverted".to_string()));
        }
        Ok(BattleRoyaleDetails {
            kind: GameKind::BattleRoyale5,
            bet_amount: "0.01".to_string(),
            started_at: None,
            participants: vec!["0xa".to_string(), "0xb".to_string(), "0xw".to_string()],
        })
    }
}

struct ChannelHandler(mpsc::UnboundedSender<GameOutcomeEvent>);

#[async_trait]
impl OutcomeHandler for ChannelHandler {
    async fn handle(&self, event: GameOutcomeEvent) {
        let _ = self.0.send(event);
    }
}

fn build_ingestor(
    chain: Arc<ScriptedChain>,
    directory: Arc<EmbeddedDirectory>,
) -> (EventIngestor, mpsc::UnboundedReceiver<GameOutcomeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ingestor = EventIngestor::new(
        chain,
        directory,
        Arc::new(ChannelHandler(tx)),
        ReconnectPolicy::default(),
    );
    (ingestor, rx)
}

async fn wait_live(ingestor: &EventIngestor) {
    let mut health = ingestor.watch_health();
    tokio::time::timeout(
        Duration::from_secs(300),
        health.wait_for(|h| *h == IngestorHealth::Live),
    )
    .await
    .expect("ingestor never went live")
    .unwrap();
}

fn raw(family: OutcomeFamily, match_id: u64, winner: &str, prize: &str) -> RawOutcome {
    RawOutcome {
        family,
        match_id,
        winner_address: winner.to_string(),
        prize_amount: prize.to_string(),
    }
}

// ============================================================
// Lifecycle
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let chain = Arc::new(ScriptedChain::default());
    let (ingestor, _events) = build_ingestor(chain.clone(), Arc::new(EmbeddedDirectory::in_memory()));

    assert!(ingestor.start());
    assert!(!ingestor.start());
    wait_live(&ingestor).await;
    assert!(!ingestor.start());

    assert_eq!(chain.subscriptions(), 1);
    assert!(ingestor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let chain = Arc::new(ScriptedChain::default());
    let (ingestor, _events) = build_ingestor(chain.clone(), Arc::new(EmbeddedDirectory::in_memory()));

    assert!(!ingestor.stop());
    assert!(ingestor.start());
    wait_live(&ingestor).await;

    assert!(ingestor.stop());
    assert!(!ingestor.stop());
    assert!(!ingestor.is_running());
    assert_eq!(ingestor.health(), IngestorHealth::Stopped);

    // Restart opens a fresh subscription.
    assert!(ingestor.start());
    wait_live(&ingestor).await;
    assert_eq!(chain.subscriptions(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_resubscribes_with_backoff() {
    let chain = Arc::new(ScriptedChain::failing(2));
    let (ingestor, _events) = build_ingestor(chain.clone(), Arc::new(EmbeddedDirectory::in_memory()));

    let started = tokio::time::Instant::now();
    ingestor.start();
    wait_live(&ingestor).await;

    // Two failures: 1s then 2s of backoff.
    assert_eq!(chain.subscriptions(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(3));

    // A dropped stream resubscribes, starting the backoff over.
    chain.drop_connection();
    let mut health = ingestor.watch_health();
    health
        .wait_for(|h| {
            *h == IngestorHealth::Reconnecting {
                attempt: 1,
                retry_in_ms: 1000,
            }
        })
        .await
        .unwrap();
    wait_live(&ingestor).await;
    assert_eq!(chain.subscriptions(), 4);

    ingestor.stop();
}

// ============================================================
// Enrichment
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_duel_event_is_enriched_with_players() {
    let chain = Arc::new(ScriptedChain::default());
    let (ingestor, mut events) =
        build_ingestor(chain.clone(), Arc::new(EmbeddedDirectory::in_memory()));
    ingestor.start();
    wait_live(&ingestor).await;

    chain
        .emit(raw(OutcomeFamily::Duel, 12, "0xp2", "0.018"))
        .await;
    let event = events.recv().await.unwrap();

    assert_eq!(event.kind, GameKind::Duel);
    assert_eq!(event.match_id, 12);
    assert_eq!(event.prize_amount, "0.018");
    assert_eq!(event.participant_addresses, vec!["0xp1", "0xp2"]);
    assert_eq!(event.winner_first(), vec!["0xp2", "0xp1"]);
}

#[tokio::test(start_paused = true)]
async fn test_battle_royale_is_recorded() {
    let chain = Arc::new(ScriptedChain::default());
    let directory = Arc::new(EmbeddedDirectory::in_memory());
    directory
        .upsert(&Recipient {
            id: 5,
            wallet_address: "0xw".to_string(),
            display_name: "winner".to_string(),
            delivery_endpoint: None,
            delivery_token: None,
            notifications_enabled: false,
            battle_royale_notifications_enabled: false,
            last_notified_at: None,
        })
        .await
        .unwrap();

    let (ingestor, mut events) = build_ingestor(chain.clone(), directory.clone());
    ingestor.start();
    wait_live(&ingestor).await;

    chain
        .emit(raw(OutcomeFamily::BattleRoyale, 3, "0xW", "0.05"))
        .await;
    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, GameKind::BattleRoyale5);
    assert_eq!(event.participant_addresses, vec!["0xa", "0xb", "0xw"]);

    // History is written by a detached task.
    let mut history = Vec::new();
    for _ in 0..50 {
        history = directory.participant_history("0xw").await;
        if !history.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(history.len(), 1);
    assert!(history[0].is_winner);
    assert_eq!(history[0].recipient_id, Some(5));
    assert_eq!(history[0].payout, "0.05");

    let loser = directory.participant_history("0xa").await;
    assert_eq!(loser.len(), 1);
    assert_eq!(loser[0].payout, "0");
    assert_eq!(loser[0].recipient_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_failed_enrichment_does_not_stop_ingestion() {
    let chain = Arc::new(ScriptedChain::default());
    let (ingestor, mut events) =
        build_ingestor(chain.clone(), Arc::new(EmbeddedDirectory::in_memory()));
    ingestor.start();
    wait_live(&ingestor).await;

    chain
        .emit(raw(OutcomeFamily::BattleRoyale, 404, "0xw", "1"))
        .await;
    chain.emit(raw(OutcomeFamily::Duel, 13, "0xp1", "1")).await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.match_id, 13);
    assert!(ingestor.is_running());
}

// ============================================================
// Isolation of history and in-flight work
// ============================================================

/// Directory whose history writes always fail.
struct FailingHistory {
    inner: EmbeddedDirectory,
    history_attempts: AtomicUsize,
}

impl FailingHistory {
    fn new() -> Self {
        Self {
            inner: EmbeddedDirectory::in_memory(),
            history_attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecipientDirectory for FailingHistory {
    async fn get_by_address(&self, address: &str) -> Result<Option<Recipient>, AppError> {
        self.inner.get_by_address(address).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Recipient>, AppError> {
        self.inner.get_by_id(id).await
    }

    async fn upsert(&self, recipient: &Recipient) -> Result<(), AppError> {
        self.inner.upsert(recipient).await
    }

    async fn update(&self, id: i64, update: &RecipientUpdate) -> Result<(), AppError> {
        self.inner.update(id, update).await
    }

    async fn list_eligible(&self, filter: EligibilityFilter) -> Result<Vec<Recipient>, AppError> {
        self.inner.list_eligible(filter).await
    }

    async fn create_match_record(&self, _record: &MatchRecord) -> Result<(), AppError> {
        self.history_attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Storage("disk full".to_string()))
    }

    async fn add_participant_record(&self, _record: &ParticipantRecord) -> Result<(), AppError> {
        self.history_attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::Storage("disk full".to_string()))
    }
}

#[derive(Debug, PartialEq)]
enum Progress {
    Started(u64),
    Finished(u64),
}

/// Handler that takes 30s per event, reporting when it starts and finishes.
struct SlowHandler(mpsc::UnboundedSender<Progress>);

#[async_trait]
impl OutcomeHandler for SlowHandler {
    async fn handle(&self, event: GameOutcomeEvent) {
        let _ = self.0.send(Progress::Started(event.match_id));
        tokio::time::sleep(Duration::from_secs(30)).await;
        let _ = self.0.send(Progress::Finished(event.match_id));
    }
}

#[tokio::test(start_paused = true)]
async fn test_history_failure_and_stop_do_not_interrupt_delivery() {
    let chain = Arc::new(ScriptedChain::default());
    let directory = Arc::new(FailingHistory::new());
    let (tx, mut progress) = mpsc::unbounded_channel();
    let ingestor = EventIngestor::new(
        chain.clone(),
        directory.clone(),
        Arc::new(SlowHandler(tx)),
        ReconnectPolicy::default(),
    );
    ingestor.start();
    wait_live(&ingestor).await;

    chain
        .emit(raw(OutcomeFamily::BattleRoyale, 9, "0xw", "0.05"))
        .await;

    // The handler runs even though recording the match fails.
    assert_eq!(progress.recv().await, Some(Progress::Started(9)));

    // Stopping mid-delivery ends the subscription but not the running job.
    assert!(ingestor.stop());
    assert!(!ingestor.is_running());
    assert_eq!(progress.recv().await, Some(Progress::Finished(9)));

    assert!(directory.history_attempts.load(Ordering::SeqCst) >= 1);
}
