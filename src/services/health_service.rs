use crate::adapters::database::DbPool;
use crate::adapters::redis::RedisClient;
use crate::config::HealthConfig;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("golfchat-server");
        Self {
            status: meter
                .i64_gauge("golfchat_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of probing one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Ok,
    /// The dependency is not wired (in-memory adapters).
    Disabled,
    Failed(String),
}

impl Probe {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Disabled => "disabled",
            Self::Failed(_) => "error",
        }
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    pool: Option<DbPool>,
    pubsub: Option<Arc<RedisClient>>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(pool: Option<DbPool>, pubsub: Option<Arc<RedisClient>>, config: HealthConfig) -> Self {
        Self { pool, pubsub, config, metrics: Metrics::new() }
    }

    /// Checks database connectivity.
    pub async fn check_db(&self) -> Probe {
        let Some(pool) = &self.pool else {
            return Probe::Disabled;
        };
        let db_timeout = Duration::from_millis(self.config.db_timeout_ms);

        let probe = match timeout(db_timeout, sqlx::query("SELECT 1").execute(pool)).await {
            Ok(Ok(_)) => Probe::Ok,
            Ok(Err(e)) => Probe::Failed(format!("Database connection failed: {e:?}")),
            Err(_) => Probe::Failed("Database connection timed out".to_string()),
        };
        self.record("database", &probe);
        probe
    }

    /// Checks `PubSub` connectivity.
    pub async fn check_pubsub(&self) -> Probe {
        let Some(pubsub) = &self.pubsub else {
            return Probe::Disabled;
        };
        let pubsub_timeout = Duration::from_millis(self.config.pubsub_timeout_ms);

        let probe = match timeout(pubsub_timeout, pubsub.ping()).await {
            Ok(Ok(())) => Probe::Ok,
            Ok(Err(e)) => Probe::Failed(format!("PubSub connection failed: {e:?}")),
            Err(_) => Probe::Failed("PubSub connection timed out".to_string()),
        };
        self.record("pubsub", &probe);
        probe
    }

    fn record(&self, component: &'static str, probe: &Probe) {
        let value = i64::from(!probe.is_failed());
        self.metrics.status.record(value, &[KeyValue::new("component", component)]);
    }
}
