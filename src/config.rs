use clap::{Args, Parser, ValueEnum};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub pubsub: PubSubConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            pubsub: PubSubConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            messaging: MessagingConfig::default(),
            health: HealthConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Postgres for messages and assignments, Redis for the insert feed
    #[default]
    Postgres,
    /// Process-local storage; nothing survives a restart
    Memory,
}

/// A golfer to professional assignment, written `GOLFER_ID:PGA_ID`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub golfer_id: Uuid,
    pub pga_id: Uuid,
}

impl FromStr for Assignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (golfer, pga) = s.split_once(':').ok_or_else(|| format!("expected GOLFER_ID:PGA_ID, got {s:?}"))?;
        let golfer_id = Uuid::parse_str(golfer.trim()).map_err(|e| format!("invalid golfer id: {e}"))?;
        let pga_id = Uuid::parse_str(pga.trim()).map_err(|e| format!("invalid professional id: {e}"))?;
        Ok(Self { golfer_id, pga_id })
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct StorageConfig {
    /// Where messages and assignments are kept
    #[arg(long = "storage", env = "GOLFCHAT_STORAGE", value_enum, default_value_t = StorageBackend::Postgres)]
    pub backend: StorageBackend,

    /// Assignments preloaded into memory storage, comma separated
    #[arg(long = "seed-assignment", env = "GOLFCHAT_SEED_ASSIGNMENTS", value_delimiter = ',')]
    pub seed_assignments: Vec<Assignment>,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL; required with postgres storage
    #[arg(id = "database_url", long = "database-url", env = "GOLFCHAT_DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long, env = "GOLFCHAT_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long, env = "GOLFCHAT_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, max_connections: 10, acquire_timeout_secs: 5 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct PubSubConfig {
    /// Redis connection URL used for the live insert feed
    #[arg(id = "pubsub_url", long = "pubsub-url", env = "GOLFCHAT_PUBSUB_URL", default_value = "redis://localhost:6379")]
    pub url: String,

    /// Channel the insert feed is published on
    #[arg(long, env = "GOLFCHAT_PUBSUB_INSERT_CHANNEL", default_value = "golfchat:messages:inserts")]
    pub insert_channel: String,

    /// Minimum backoff between resubscribe attempts
    #[arg(long, env = "GOLFCHAT_PUBSUB_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    /// Maximum backoff between resubscribe attempts
    #[arg(long, env = "GOLFCHAT_PUBSUB_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            insert_channel: "golfchat:messages:inserts".to_string(),
            min_backoff_secs: 1,
            max_backoff_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "GOLFCHAT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "GOLFCHAT_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management (health) server
    #[arg(long, env = "GOLFCHAT_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks during shutdown
    #[arg(long, env = "GOLFCHAT_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 3000, mgmt_port: 9090, shutdown_timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret key for verifying session tokens (HS256)
    #[arg(long, env = "GOLFCHAT_JWT_SECRET")]
    pub jwt_secret: String,

    /// Lifetime of tokens minted by this service, in seconds
    #[arg(long, env = "GOLFCHAT_TOKEN_TTL_SECS", default_value_t = 900)]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { jwt_secret: "change-me".to_string(), token_ttl_secs: 900 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Upper bound for any single store or directory call
    #[arg(long, env = "GOLFCHAT_OPERATION_TIMEOUT_MS", default_value_t = 10_000)]
    pub operation_timeout_ms: u64,

    /// Capacity of the in-process insert feed
    #[arg(long, env = "GOLFCHAT_FEED_CAPACITY", default_value_t = 256)]
    pub feed_capacity: usize,

    /// Maximum accepted message length in characters
    #[arg(long, env = "GOLFCHAT_MAX_MESSAGE_CHARS", default_value_t = 4000)]
    pub max_message_chars: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { operation_timeout_ms: 10_000, feed_capacity: 256, max_message_chars: 4000 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the database readiness probe
    #[arg(long, env = "GOLFCHAT_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,

    /// Timeout for the pub/sub readiness probe
    #[arg(long, env = "GOLFCHAT_HEALTH_PUBSUB_TIMEOUT_MS", default_value_t = 2000)]
    pub pubsub_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { db_timeout_ms: 2000, pubsub_timeout_ms: 2000 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; export is disabled when unset
    #[arg(long, env = "GOLFCHAT_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "GOLFCHAT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}
