use crate::adapters::database::DbPool;
use crate::services::directory::{DirectoryError, DirectoryService};
use async_trait::async_trait;
use uuid::Uuid;

/// Reads golfer assignments from the `golfers` table.
#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: DbPool,
}

impl PgDirectory {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryService for PgDirectory {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn assigned_professional(&self, golfer_id: Uuid) -> Result<Option<Uuid>, DirectoryError> {
        // A missing golfer row and a NULL assignment both mean "not assigned".
        let pga_id = sqlx::query_scalar::<_, Option<Uuid>>("SELECT pga_id FROM golfers WHERE id = $1")
            .bind(golfer_id)
            .fetch_optional(&self.pool)
            .await?
            .flatten();

        Ok(pga_id)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn assigned_golfers(&self, pga_id: Uuid) -> Result<Vec<Uuid>, DirectoryError> {
        let golfers = sqlx::query_scalar::<_, Uuid>("SELECT id FROM golfers WHERE pga_id = $1 ORDER BY id")
            .bind(pga_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(golfers)
    }
}
