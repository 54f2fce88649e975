use crate::adapters::database::DbPool;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::redis::InsertFeed;
use crate::domain::message::{ConversationPair, Message, NewMessage};
use crate::services::store::{InsertSubscription, MessageStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;

/// Postgres-backed message store whose insert feed is fanned out over Redis.
#[derive(Clone, Debug)]
pub struct PgMessageStore {
    pool: DbPool,
    repo: MessageRepository,
    feed: Arc<InsertFeed>,
}

impl PgMessageStore {
    #[must_use]
    pub const fn new(pool: DbPool, repo: MessageRepository, feed: Arc<InsertFeed>) -> Self {
        Self { pool, repo, feed }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert_message(&self, message: &NewMessage) -> Result<Message, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let stored = self.repo.create(&mut conn, message).await?;

        // The row is committed at this point; a lost publish only costs live delivery.
        if let Err(e) = self.feed.publish(&stored).await {
            tracing::error!(error = %e, message_id = %stored.id(), "Failed to publish insert event");
        }

        Ok(stored)
    }

    async fn query_messages(&self, pair: ConversationPair) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        self.repo.fetch_conversation(&mut conn, pair).await
    }

    async fn subscribe_inserts(&self) -> Result<InsertSubscription, StoreError> {
        self.feed.subscribe().map_err(StoreError::Unavailable)
    }
}
