use crate::domain::actor::Actor;
use crate::domain::message::{ConversationPair, Message, NewMessage};
use crate::error::{AppError, Result, ValidationError};
use crate::services::live_conversation::LiveConversation;
use crate::services::store::{InsertSubscription, MessageStore};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) sent_total: Counter<u64>,
    pub(crate) load_size: Histogram<u64>,
    pub(crate) live_events_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("golfchat-server");
        Self {
            sent_total: meter
                .u64_counter("golfchat_messages_sent_total")
                .with_description("Message send attempts by outcome")
                .build(),
            load_size: meter
                .u64_histogram("golfchat_conversation_load_size")
                .with_description("Number of messages returned by a conversation load")
                .build(),
            live_events_total: meter
                .u64_counter("golfchat_live_events_total")
                .with_description("Insert events seen by live conversations, by outcome")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConversationService {
    store: Arc<dyn MessageStore>,
    timeout: Duration,
    max_message_chars: usize,
    pub(crate) metrics: Metrics,
}

impl ConversationService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, timeout: Duration, max_message_chars: usize) -> Self {
        Self { store, timeout, max_message_chars, metrics: Metrics::new() }
    }

    /// Loads the full, ordered history between two actors.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if both actors are of the same kind.
    /// Returns `AppError::LoadFailed` if the store fails or times out.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, viewer, counterpart),
        fields(viewer = %viewer, counterpart = %counterpart, messages = tracing::field::Empty)
    )]
    pub async fn load(&self, viewer: Actor, counterpart: Actor) -> Result<Vec<Message>> {
        let pair = ConversationPair::between(viewer, counterpart)?;
        let messages = self.load_pair(pair).await?;
        tracing::Span::current().record("messages", messages.len());
        Ok(messages)
    }

    pub(crate) async fn load_pair(&self, pair: ConversationPair) -> Result<Vec<Message>> {
        let messages = match tokio::time::timeout(self.timeout, self.store.query_messages(pair)).await {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => return Err(AppError::LoadFailed(e.to_string())),
            Err(_) => {
                return Err(AppError::LoadFailed(format!("store did not respond within {:?}", self.timeout)));
            }
        };

        self.metrics.load_size.record(messages.len() as u64, &[]);
        Ok(messages)
    }

    /// Validates and appends one message.
    ///
    /// Whitespace-only text is a silent no-op and returns `Ok(None)`; nothing
    /// reaches the store.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for a same-kind pairing or over-long text.
    /// Returns `AppError::SendFailed` if the store rejects the insert or times out.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, sender, receiver, text),
        fields(sender = %sender, receiver = %receiver)
    )]
    pub async fn send(&self, sender: Actor, receiver: Actor, text: &str) -> Result<Option<Message>> {
        let draft = match NewMessage::new(sender, receiver, text) {
            Ok(draft) => draft,
            Err(ValidationError::EmptyText) => {
                tracing::debug!("Ignoring empty message");
                return Ok(None);
            }
            Err(e @ ValidationError::InvalidPairing) => {
                tracing::warn!(sender_kind = %sender.kind, receiver_kind = %receiver.kind, "Rejected same-kind message");
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "rejected")]);
                return Err(e.into());
            }
        };

        if draft.text().chars().count() > self.max_message_chars {
            self.metrics.sent_total.add(1, &[KeyValue::new("status", "rejected")]);
            return Err(AppError::BadRequest(format!("Message exceeds {} characters", self.max_message_chars)));
        }

        match tokio::time::timeout(self.timeout, self.store.insert_message(&draft)).await {
            Ok(Ok(message)) => {
                tracing::debug!(message_id = %message.id(), "Message stored");
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "success")]);
                Ok(Some(message))
            }
            Ok(Err(e)) => {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "failure")]);
                Err(AppError::SendFailed(e.to_string()))
            }
            Err(_) => {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "timeout")]);
                Err(AppError::SendFailed(format!("store did not respond within {:?}", self.timeout)))
            }
        }
    }

    /// Opens a live view of the conversation between `viewer` and `counterpart`.
    ///
    /// The insert subscription is taken before the history query, so inserts
    /// racing the load are buffered and replayed (deduplicated) afterwards. If
    /// the feed is unavailable the view is opened in load-only mode.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if both actors are of the same kind.
    /// Returns `AppError::LoadFailed` if the initial history load fails.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, viewer, counterpart),
        fields(viewer = %viewer, counterpart = %counterpart)
    )]
    pub async fn open(&self, viewer: Actor, counterpart: Actor) -> Result<LiveConversation> {
        let pair = ConversationPair::between(viewer, counterpart)?;

        let subscription = self.subscribe().await;
        if let Err(e) = &subscription {
            tracing::warn!(error = %e, "Continuing in load-only mode");
        }
        let history = self.load_pair(pair).await?;

        let mut view = LiveConversation::new(self.clone(), viewer, counterpart, pair, history, subscription);
        view.drain_buffered().await?;
        Ok(view)
    }

    /// Takes a feed subscription.
    ///
    /// # Errors
    /// Returns `AppError::SubscriptionFailed` if the feed is down or does not
    /// respond in time.
    pub(crate) async fn subscribe(&self) -> Result<InsertSubscription> {
        match tokio::time::timeout(self.timeout, self.store.subscribe_inserts()).await {
            Ok(Ok(subscription)) => Ok(subscription),
            Ok(Err(e)) => Err(AppError::SubscriptionFailed(e.to_string())),
            Err(_) => Err(AppError::SubscriptionFailed(format!("feed did not respond within {:?}", self.timeout))),
        }
    }
}
