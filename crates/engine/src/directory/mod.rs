//! Recipient directory backends.

pub mod embedded;
pub mod postgres;
pub mod redis;

use std::sync::Arc;

use herald_common::config::{AppConfig, DirectoryBackend};
use herald_common::directory::RecipientDirectory;

pub use self::embedded::EmbeddedDirectory;
pub use self::postgres::PgDirectory;
pub use self::redis::RedisDirectory;

/// Open the backend selected by `DIRECTORY_BACKEND`.
pub async fn open_directory(config: &AppConfig) -> anyhow::Result<Arc<dyn RecipientDirectory>> {
    let directory: Arc<dyn RecipientDirectory> = match config.directory_backend {
        DirectoryBackend::Embedded => {
            Arc::new(EmbeddedDirectory::open(&config.directory_path).await?)
        }
        DirectoryBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("REDIS_URL is required when DIRECTORY_BACKEND=redis")
            })?;
            let conn = herald_common::redis_pool::create_redis_pool(url).await?;
            Arc::new(RedisDirectory::new(conn))
        }
        DirectoryBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                anyhow::anyhow!("DATABASE_URL is required when DIRECTORY_BACKEND=postgres")
            })?;
            let pool = herald_common::db::create_pool(url, config.db_max_connections).await?;
            herald_common::db::migrate(&pool).await?;
            Arc::new(PgDirectory::new(pool))
        }
    };

    tracing::info!(backend = ?config.directory_backend, "Recipient directory ready");
    Ok(directory)
}
