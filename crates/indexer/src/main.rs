use std::sync::Arc;
use std::time::Duration;

use herald_common::config::AppConfig;
use herald_engine::batcher::{DeliveryBatcher, Pacing};
use herald_engine::directory::open_directory;
use herald_engine::outcome::OutcomeNotifier;
use herald_engine::payload::PayloadContext;
use herald_indexer::{AlloyChainClient, EventIngestor, ReconnectPolicy};
use herald_notifier::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_indexer=info,herald_engine=info,herald_decoders=debug".into()),
        )
        .json()
        .init();

    tracing::info!("ArenaHerald listener starting...");

    let config = AppConfig::from_env()?;
    let directory = open_directory(&config).await?;

    let transport = Arc::new(HttpTransport::new(Duration::from_millis(
        config.transport_timeout_ms,
    ))?);
    let batcher = Arc::new(DeliveryBatcher::new(transport, directory.clone()));
    let notifier = Arc::new(OutcomeNotifier::new(
        directory.clone(),
        batcher,
        PayloadContext::new(&config.app_url, &config.currency_symbol),
        Pacing::from_config(&config),
    ));

    let chain = Arc::new(AlloyChainClient::new(
        config.chain_ws_url.clone(),
        &config.game_contract_address,
    )?);
    let ingestor = EventIngestor::new(
        chain,
        directory,
        notifier,
        ReconnectPolicy {
            initial: Duration::from_millis(config.reconnect_initial_ms),
            max: Duration::from_millis(config.reconnect_max_ms),
        },
    );

    ingestor.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    ingestor.stop();

    tracing::info!("ArenaHerald listener stopped.");
    Ok(())
}
