#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::memory::{InMemoryDirectory, InMemoryMessageStore};
use crate::adapters::database::{DbPool, PgDirectory, PgMessageStore};
use crate::adapters::redis::{InsertFeed, PubSubMessage, RedisClient};
use crate::api::ServiceContainer;
use crate::config::{Config, StorageBackend};
use crate::services::auth_service::AuthService;
use crate::services::conversation_service::ConversationService;
use crate::services::counterpart_service::CounterpartService;
use crate::services::directory::DirectoryService;
use crate::services::health_service::HealthService;
use crate::services::store::MessageStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Long-running background tasks, spawned once the listeners are bound.
#[derive(Debug, Default)]
pub struct Workers {
    insert_feed: Option<(Arc<InsertFeed>, broadcast::Receiver<PubSubMessage>)>,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if let Some((feed, upstream)) = self.insert_feed {
            tasks.push(tokio::spawn(feed.run(upstream, shutdown_rx)));
        }

        tasks
    }
}

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

/// Wires adapters into services.
///
/// Explicit adapters (`with_directory`, `with_message_store`) take precedence.
/// Otherwise postgres storage needs `with_database` and `with_pubsub`, while
/// memory storage builds process-local adapters seeded from the config.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    pubsub: Option<Arc<RedisClient>>,
    directory: Option<Arc<dyn DirectoryService>>,
    store: Option<Arc<dyn MessageStore>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, pubsub: None, directory: None, store: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Arc<RedisClient>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn DirectoryService>) -> Self {
        self.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn with_message_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the services.
    ///
    /// # Errors
    /// Returns an error if an adapter is missing or the insert feed cannot
    /// subscribe to `PubSub`.
    pub async fn build(self) -> anyhow::Result<App> {
        let mut workers = Workers::default();

        let backend = self.config.storage.backend;

        let directory: Arc<dyn DirectoryService> = match (self.directory, backend, &self.pool) {
            (Some(directory), _, _) => directory,
            (None, StorageBackend::Memory, _) => {
                let directory = InMemoryDirectory::new();
                for seed in &self.config.storage.seed_assignments {
                    directory.assign(seed.golfer_id, seed.pga_id);
                }
                tracing::info!(assignments = self.config.storage.seed_assignments.len(), "Using in-memory directory");
                Arc::new(directory)
            }
            (None, StorageBackend::Postgres, Some(pool)) => Arc::new(PgDirectory::new(pool.clone())),
            (None, StorageBackend::Postgres, None) => anyhow::bail!("no directory adapter configured"),
        };

        let store: Arc<dyn MessageStore> = match (self.store, backend, &self.pool, &self.pubsub) {
            (Some(store), _, _, _) => store,
            (None, StorageBackend::Memory, _, _) => {
                tracing::warn!("Using in-memory message store; messages are lost on exit");
                Arc::new(InMemoryMessageStore::new(self.config.messaging.feed_capacity))
            }
            (None, StorageBackend::Postgres, Some(pool), Some(pubsub)) => {
                let feed = Arc::new(InsertFeed::new(
                    Arc::clone(pubsub),
                    self.config.pubsub.insert_channel.clone(),
                    self.config.messaging.feed_capacity,
                ));
                let upstream = feed.connect().await?;
                workers.insert_feed = Some((Arc::clone(&feed), upstream));
                Arc::new(PgMessageStore::new(pool.clone(), MessageRepository::new(), feed))
            }
            (None, StorageBackend::Postgres, _, _) => anyhow::bail!("no message store configured"),
        };

        let timeout = Duration::from_millis(self.config.messaging.operation_timeout_ms);

        let services = ServiceContainer {
            auth_service: AuthService::new(self.config.auth.clone()),
            counterpart_service: CounterpartService::new(directory, timeout),
            conversation_service: ConversationService::new(store, timeout, self.config.messaging.max_message_chars),
        };

        let health_service = HealthService::new(self.pool, self.pubsub, self.config.health.clone());

        Ok(App { services, health_service, workers })
    }
}

/// Applies pending database migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Flips `shutdown_tx` on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
            () = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }

        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through `tracing` so they reach the configured log sink.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();

        tracing::error!(panic.location = %location, panic.payload = %payload, "Panic occurred");
    }));
}
