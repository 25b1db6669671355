use redis::Client;
use redis::aio::ConnectionManager;

/// Open a Redis connection manager. The manager reconnects on its own after drops.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client =
        Client::open(redis_url).map_err(|e| anyhow::anyhow!("Invalid REDIS_URL: {}", e))?;
    let manager = client.get_connection_manager().await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
