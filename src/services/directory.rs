use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Directory unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// Read-only view of the golfer to professional assignment relation.
#[async_trait]
pub trait DirectoryService: Send + Sync + std::fmt::Debug {
    /// Returns the professional assigned to a golfer, if any.
    ///
    /// # Errors
    /// Returns `DirectoryError` if the directory cannot be reached.
    async fn assigned_professional(&self, golfer_id: Uuid) -> Result<Option<Uuid>, DirectoryError>;

    /// Returns every golfer assigned to a professional.
    ///
    /// # Errors
    /// Returns `DirectoryError` if the directory cannot be reached.
    async fn assigned_golfers(&self, pga_id: Uuid) -> Result<Vec<Uuid>, DirectoryError>;
}
