use serde::Deserialize;

/// Storage backend behind the recipient directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryBackend {
    /// JSON file on local disk
    Embedded,
    Redis,
    Postgres,
}

impl std::str::FromStr for DirectoryBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" | "file" => Ok(DirectoryBackend::Embedded),
            "redis" => Ok(DirectoryBackend::Redis),
            "postgres" | "postgresql" => Ok(DirectoryBackend::Postgres),
            other => Err(anyhow::anyhow!(
                "DIRECTORY_BACKEND must be one of embedded, redis, postgres (got '{}')",
                other
            )),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// WebSocket RPC URL used for the outcome event subscription and contract reads
    pub chain_ws_url: String,

    /// Address of the game contract emitting `DuelCompleted` / `BattleRoyaleCompleted`
    pub game_contract_address: String,

    /// Which directory backend to use (default: embedded)
    pub directory_backend: DirectoryBackend,

    /// File path for the embedded directory backend
    pub directory_path: String,

    /// PostgreSQL connection string (required for the postgres backend)
    pub database_url: Option<String>,

    /// Redis connection string (required for the redis backend)
    pub redis_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Public base URL of the app, used for notification target URLs
    pub app_url: String,

    /// Currency symbol appended to prize amounts in notification copy
    pub currency_symbol: String,

    /// Shared secret expected as `Authorization: Bearer <secret>` on trigger routes
    pub trigger_secret: Option<String>,

    /// API server port (default: 3000)
    pub api_port: u16,

    /// Recipients per delivery batch (default: 50)
    pub delivery_batch_size: usize,

    /// Delay between sends inside a batch in milliseconds (default: 200)
    pub delivery_item_delay_ms: u64,

    /// Delay between batches in milliseconds (default: 5000)
    pub delivery_batch_delay_ms: u64,

    /// Delay between daily reminder sends in milliseconds (default: 1000)
    pub reminder_delay_ms: u64,

    /// Cron expression (with seconds, UTC) for the daily reminder run
    pub reminder_cron: String,

    /// Per-request timeout for the delivery endpoint in milliseconds (default: 10000)
    pub transport_timeout_ms: u64,

    /// First resubscription delay after the chain connection drops (default: 1000)
    pub reconnect_initial_ms: u64,

    /// Upper bound for the resubscription delay (default: 60000)
    pub reconnect_max_ms: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            chain_ws_url: std::env::var("CHAIN_WS_URL")
                .map_err(|_| anyhow::anyhow!("CHAIN_WS_URL environment variable is required"))?,
            game_contract_address: std::env::var("GAME_CONTRACT_ADDRESS").map_err(|_| {
                anyhow::anyhow!("GAME_CONTRACT_ADDRESS environment variable is required")
            })?,
            directory_backend: std::env::var("DIRECTORY_BACKEND")
                .unwrap_or_else(|_| "embedded".to_string())
                .parse()?,
            directory_path: std::env::var("DIRECTORY_PATH")
                .unwrap_or_else(|_| "data/directory.json".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            currency_symbol: std::env::var("CURRENCY_SYMBOL").unwrap_or_else(|_| "ETH".to_string()),
            trigger_secret: std::env::var("TRIGGER_SECRET").ok().filter(|s| !s.is_empty()),
            api_port: env_or("API_PORT", 3000)?,
            delivery_batch_size: env_or("DELIVERY_BATCH_SIZE", 50)?,
            delivery_item_delay_ms: env_or("DELIVERY_ITEM_DELAY_MS", 200)?,
            delivery_batch_delay_ms: env_or("DELIVERY_BATCH_DELAY_MS", 5000)?,
            reminder_delay_ms: env_or("REMINDER_DELAY_MS", 1000)?,
            reminder_cron: std::env::var("REMINDER_CRON")
                .unwrap_or_else(|_| "0 0 17 * * *".to_string()),
            transport_timeout_ms: env_or("TRANSPORT_TIMEOUT_MS", 10_000)?,
            reconnect_initial_ms: env_or("RECONNECT_INITIAL_MS", 1000)?,
            reconnect_max_ms: env_or("RECONNECT_MAX_MS", 60_000)?,
        })
    }
}

/// Read and parse an optional numeric variable, falling back to `default`.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| {
            anyhow::anyhow!("{} must be a valid {}", key, std::any::type_name::<T>())
        }),
        Err(_) => Ok(default),
    }
}
