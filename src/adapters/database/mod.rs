pub mod directory_repo;
pub mod message_repo;
pub mod message_store;
pub mod records;

pub use directory_repo::PgDirectory;
pub use message_store::PgMessageStore;

use crate::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if no URL is configured or the connection fails.
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let url = config.url.as_deref().ok_or_else(|| sqlx::Error::Configuration("database url is not set".into()))?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(url)
        .await
}
