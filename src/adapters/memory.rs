//! Process-local directory and message store. Used by the test suite and by
//! `--storage memory`, which runs the server without Postgres or Redis.

use crate::domain::message::{ConversationPair, Message, NewMessage};
use crate::services::directory::{DirectoryError, DirectoryService};
use crate::services::store::{FeedSignal, InsertSubscription, MessageStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    // golfer -> assigned professional
    assignments: DashMap<Uuid, Uuid>,
    offline: AtomicBool,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, golfer_id: Uuid, pga_id: Uuid) {
        self.assignments.insert(golfer_id, pga_id);
    }

    pub fn unassign(&self, golfer_id: Uuid) {
        self.assignments.remove(&golfer_id);
    }

    /// While offline every lookup fails as if the directory were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), DirectoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(anyhow::anyhow!("directory offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryService for InMemoryDirectory {
    async fn assigned_professional(&self, golfer_id: Uuid) -> Result<Option<Uuid>, DirectoryError> {
        self.check_online()?;
        Ok(self.assignments.get(&golfer_id).map(|entry| *entry.value()))
    }

    async fn assigned_golfers(&self, pga_id: Uuid) -> Result<Vec<Uuid>, DirectoryError> {
        self.check_online()?;
        let mut golfers: Vec<Uuid> =
            self.assignments.iter().filter(|entry| *entry.value() == pga_id).map(|entry| *entry.key()).collect();
        golfers.sort_unstable();
        Ok(golfers)
    }
}

#[derive(Debug)]
struct Log {
    messages: Vec<Message>,
    next_seq: i64,
}

#[derive(Debug)]
pub struct InMemoryMessageStore {
    log: RwLock<Log>,
    feed: broadcast::Sender<FeedSignal>,
    offline: AtomicBool,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new(feed_capacity: usize) -> Self {
        let (feed, _rx) = broadcast::channel(feed_capacity.max(1));
        Self { log: RwLock::new(Log { messages: Vec::new(), next_seq: 1 }), feed, offline: AtomicBool::new(false) }
    }

    /// While offline inserts and queries fail; the insert feed stays up.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of messages persisted so far.
    pub async fn len(&self) -> usize {
        self.log.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(anyhow::anyhow!("message store offline")));
        }
        Ok(())
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_message(&self, message: &NewMessage) -> Result<Message, StoreError> {
        self.check_online()?;

        // Held across the broadcast so feed order matches commit order.
        let mut log = self.log.write().await;
        let seq = log.next_seq;
        let stored = Message::from_store(
            Uuid::now_v7(),
            seq,
            message.directional_fields(),
            message.text().to_string(),
            OffsetDateTime::now_utc(),
        )?;
        log.next_seq += 1;
        log.messages.push(stored.clone());

        let _ = self.feed.send(FeedSignal::Inserted(stored.clone()));
        Ok(stored)
    }

    async fn query_messages(&self, pair: ConversationPair) -> Result<Vec<Message>, StoreError> {
        self.check_online()?;

        let log = self.log.read().await;
        let mut messages: Vec<Message> = log.messages.iter().filter(|m| pair.contains(m)).cloned().collect();
        messages.sort_by_key(Message::order_key);
        Ok(messages)
    }

    async fn subscribe_inserts(&self) -> Result<InsertSubscription, StoreError> {
        Ok(InsertSubscription::new(self.feed.subscribe()))
    }
}
