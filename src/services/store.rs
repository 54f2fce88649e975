use crate::domain::message::{ConversationPair, MalformedMessage, Message, NewMessage};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Malformed(#[from] MalformedMessage),
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// Durable, append-only message store with a table-wide insert feed.
/// Messages are never updated or deleted.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Persists a message; id, sequence and timestamp are assigned by the store.
    ///
    /// # Errors
    /// Returns `StoreError` if the insert is rejected.
    async fn insert_message(&self, message: &NewMessage) -> Result<Message, StoreError>;

    /// Returns every message of a pair, ascending by `(created_at, seq)`.
    ///
    /// # Errors
    /// Returns `StoreError` if the query fails or a row is malformed.
    async fn query_messages(&self, pair: ConversationPair) -> Result<Vec<Message>, StoreError>;

    /// Opens a handle on the insert feed. Only inserts committed after this
    /// call returns are guaranteed to be observed.
    ///
    /// # Errors
    /// Returns `StoreError` if the feed cannot be established.
    async fn subscribe_inserts(&self) -> Result<InsertSubscription, StoreError>;
}

/// What feed producers broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum FeedSignal {
    Inserted(Message),
    /// The upstream feed was interrupted; inserts may have been missed.
    Interrupted,
    /// The upstream feed stopped; nothing further will be delivered.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Inserted(Message),
    /// Inserts may have been missed, either because this subscriber fell
    /// behind or because the upstream feed reconnected.
    Gap,
    Closed,
}

/// A live handle on the insert feed. Dropping it unsubscribes.
#[derive(Debug)]
pub struct InsertSubscription {
    rx: broadcast::Receiver<FeedSignal>,
}

impl InsertSubscription {
    #[must_use]
    pub const fn new(rx: broadcast::Receiver<FeedSignal>) -> Self {
        Self { rx }
    }

    /// Waits for the next feed event.
    pub async fn recv(&mut self) -> FeedEvent {
        match self.rx.recv().await {
            Ok(signal) => signal.into(),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "Insert subscription lagged");
                FeedEvent::Gap
            }
            Err(broadcast::error::RecvError::Closed) => FeedEvent::Closed,
        }
    }

    /// Returns an already-buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<FeedEvent> {
        match self.rx.try_recv() {
            Ok(signal) => Some(signal.into()),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!(missed = n, "Insert subscription lagged");
                Some(FeedEvent::Gap)
            }
            Err(broadcast::error::TryRecvError::Closed) => Some(FeedEvent::Closed),
            Err(broadcast::error::TryRecvError::Empty) => None,
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl From<FeedSignal> for FeedEvent {
    fn from(signal: FeedSignal) -> Self {
        match signal {
            FeedSignal::Inserted(message) => Self::Inserted(message),
            FeedSignal::Interrupted => Self::Gap,
            FeedSignal::Closed => Self::Closed,
        }
    }
}
