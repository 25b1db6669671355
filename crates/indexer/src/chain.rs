//! Chain access for the ingestor.
//!
//! `ChainClient` is the seam between the ingestor and the network: one live
//! log subscription plus two point reads on the game contract.

use std::future::Future;
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::pubsub::Subscription;
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, mpsc};

use herald_common::error::AppError;
use herald_common::types::{BattleRoyaleDetails, GameKind, RawOutcome};
use herald_decoders::DecoderRegistry;
use herald_decoders::amount::{NATIVE_DECIMALS, format_amount};

/// Capacity of the channel between the subscription task and the ingestor.
const SUBSCRIPTION_BUFFER: usize = 256;

sol! {
    #[sol(rpc)]
    interface IGameArena {
        /// Both players of a duel, challenger first.
        function getDuelPlayers(uint256 duelId) external view returns (address challenger, address opponent);

        /// Mode (0 = 5 players, 1 = 100, 2 = 1000), stake per player, start time, and players in join order.
        function getBattleRoyale(uint256 royaleId)
            external
            view
            returns (uint8 mode, uint256 betAmount, uint256 startedAt, address[] memory players);
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Open a subscription to completion events.
    ///
    /// The receiver closes when the underlying connection drops; the caller is
    /// expected to subscribe again.
    async fn subscribe(&self) -> Result<mpsc::Receiver<RawOutcome>, AppError>;

    /// Addresses of both duel players.
    async fn duel_participants(&self, match_id: u64) -> Result<Vec<String>, AppError>;

    async fn battle_royale(&self, match_id: u64) -> Result<BattleRoyaleDetails, AppError>;
}

/// `ChainClient` over a WebSocket RPC connection.
pub struct AlloyChainClient {
    ws_url: String,
    contract: Address,
    /// Connection shared by the subscription and the point reads. Replaced on
    /// every `subscribe` so a reconnect also refreshes the read path.
    provider: Mutex<Option<DynProvider>>,
}

impl AlloyChainClient {
    pub fn new(ws_url: impl Into<String>, contract_address: &str) -> Result<Self, AppError> {
        let contract = Address::from_str(contract_address).map_err(|e| {
            AppError::Config(format!(
                "GAME_CONTRACT_ADDRESS '{}' is not an address: {}",
                contract_address, e
            ))
        })?;

        Ok(Self {
            ws_url: ws_url.into(),
            contract,
            provider: Mutex::new(None),
        })
    }

    async fn connect(&self) -> Result<DynProvider, AppError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(self.ws_url.clone()))
            .await
            .map_err(|e| AppError::Rpc(format!("WebSocket connect failed: {}", e)))?;
        Ok(provider.erased())
    }

    async fn provider(&self) -> Result<DynProvider, AppError> {
        let mut slot = self.provider.lock().await;
        if let Some(provider) = slot.as_ref() {
            return Ok(provider.clone());
        }
        let provider = self.connect().await?;
        *slot = Some(provider.clone());
        Ok(provider)
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn subscribe(&self) -> Result<mpsc::Receiver<RawOutcome>, AppError> {
        let provider = self.connect().await?;
        *self.provider.lock().await = Some(provider.clone());

        let decoders = DecoderRegistry::default();
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(decoders.all_signatures());

        let subscription = provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| AppError::Rpc(format!("eth_subscribe failed: {}", e)))?;

        tracing::info!(contract = %self.contract, "Subscribed to game outcome logs");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            // The connection lives exactly as long as the forwarder.
            let _provider = provider;
            forward_logs(subscription, decoders, tx).await;
        });

        Ok(rx)
    }

    async fn duel_participants(&self, match_id: u64) -> Result<Vec<String>, AppError> {
        let contract = IGameArena::new(self.contract, self.provider().await?);
        let players = contract
            .getDuelPlayers(U256::from(match_id))
            .call()
            .await
            .map_err(|e| AppError::Rpc(format!("getDuelPlayers({}) failed: {}", match_id, e)))?;

        Ok(vec![
            format!("{:#x}", players.challenger),
            format!("{:#x}", players.opponent),
        ])
    }

    async fn battle_royale(&self, match_id: u64) -> Result<BattleRoyaleDetails, AppError> {
        let contract = IGameArena::new(self.contract, self.provider().await?);
        let royale = contract
            .getBattleRoyale(U256::from(match_id))
            .call()
            .await
            .map_err(|e| AppError::Rpc(format!("getBattleRoyale({}) failed: {}", match_id, e)))?;

        let kind = GameKind::from_battle_royale_mode(royale.mode).ok_or_else(|| {
            AppError::Decode(format!(
                "battle royale {} has unknown mode {}",
                match_id, royale.mode
            ))
        })?;
        let started_at = u64::try_from(royale.startedAt)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        Ok(BattleRoyaleDetails {
            kind,
            bet_amount: format_amount(royale.betAmount, NATIVE_DECIMALS),
            started_at,
            participants: royale
                .players
                .iter()
                .map(|address| format!("{:#x}", address))
                .collect(),
        })
    }
}

/// Anything that yields subscription logs the way a pubsub subscription does.
pub(crate) trait LogSource: Send {
    fn next_log(&mut self) -> impl Future<Output = Result<Log, RecvError>> + Send;
}

impl LogSource for Subscription<Log> {
    fn next_log(&mut self) -> impl Future<Output = Result<Log, RecvError>> + Send {
        self.recv()
    }
}

/// Decode logs into `tx` until the source closes or the receiving side is dropped.
pub(crate) async fn forward_logs(
    mut source: impl LogSource,
    decoders: DecoderRegistry,
    tx: mpsc::Sender<RawOutcome>,
) {
    loop {
        let received = tokio::select! {
            received = source.next_log() => received,
            _ = tx.closed() => {
                tracing::debug!("Outcome receiver dropped, closing log subscription");
                return;
            }
        };

        match received {
            Ok(log) => {
                if log.removed {
                    tracing::debug!(tx_hash = ?log.transaction_hash, "Ignoring removed log");
                    continue;
                }
                let Some(outcome) = decoders.decode(&log.inner) else {
                    continue;
                };
                if tx.send(outcome).await.is_err() {
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Log subscription lagged, events dropped");
            }
            Err(RecvError::Closed) => {
                tracing::warn!("Log subscription closed");
                return;
            }
        }
    }
}
