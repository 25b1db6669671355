//! ArenaHerald API server binary entrypoint.
//!
//! Runs the event ingestor, the daily reminder cron and the HTTP trigger
//! surface in one process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_engine::batcher::{DeliveryBatcher, Pacing};
use herald_engine::directory::open_directory;
use herald_engine::outcome::OutcomeNotifier;
use herald_engine::payload::PayloadContext;
use herald_engine::reminder::DailyReminderScheduler;
use herald_indexer::{AlloyChainClient, EventIngestor, ReconnectPolicy};
use herald_notifier::HttpTransport;

use herald_api::cron::ReminderCron;
use herald_api::routes::create_router;
use herald_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("herald_api=debug,herald_engine=info,herald_indexer=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting ArenaHerald API server...");

    // Load configuration
    let config = AppConfig::from_env()?;
    if config.trigger_secret.is_none() {
        anyhow::bail!("TRIGGER_SECRET environment variable is required");
    }

    let directory = open_directory(&config).await?;
    let transport = Arc::new(HttpTransport::new(Duration::from_millis(
        config.transport_timeout_ms,
    ))?);
    let ctx = PayloadContext::new(&config.app_url, &config.currency_symbol);

    // Outcome path: chain -> ingestor -> notifier -> batcher
    let batcher = Arc::new(DeliveryBatcher::new(transport.clone(), directory.clone()));
    let notifier = Arc::new(OutcomeNotifier::new(
        directory.clone(),
        batcher,
        ctx.clone(),
        Pacing::from_config(&config),
    ));
    let chain = Arc::new(AlloyChainClient::new(
        config.chain_ws_url.clone(),
        &config.game_contract_address,
    )?);
    let ingestor = Arc::new(EventIngestor::new(
        chain,
        directory.clone(),
        notifier,
        ReconnectPolicy {
            initial: Duration::from_millis(config.reconnect_initial_ms),
            max: Duration::from_millis(config.reconnect_max_ms),
        },
    ));
    ingestor.start();

    // Daily path: cron -> reminder scheduler
    let reminders = Arc::new(DailyReminderScheduler::new(
        directory.clone(),
        transport,
        ctx,
        Duration::from_millis(config.reminder_delay_ms),
    ));
    let cron = ReminderCron::start(&config.reminder_cron, reminders.clone()).await?;

    let port = config.api_port;
    let state = AppState::new(directory, ingestor.clone(), reminders, config);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    ingestor.stop();
    cron.shutdown().await?;

    tracing::info!("ArenaHerald API server stopped.");
    Ok(())
}
