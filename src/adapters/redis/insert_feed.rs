use crate::adapters::redis::{PubSubMessage, RedisClient};
use crate::domain::message::{DirectionalFields, Message};
use crate::services::store::{FeedSignal, InsertSubscription};
use opentelemetry::{KeyValue, global, metrics::Counter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    published_total: Counter<u64>,
    received_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("golfchat-server");
        Self {
            published_total: meter
                .u64_counter("golfchat_insert_events_published_total")
                .with_description("Insert events published to PubSub")
                .build(),
            received_total: meter
                .u64_counter("golfchat_insert_events_received_total")
                .with_description("Insert events received from PubSub")
                .build(),
        }
    }
}

/// JSON payload carried on the insert channel.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct InsertEvent {
    id: Uuid,
    seq: i64,
    sender_golfer_id: Option<Uuid>,
    sender_pga_id: Option<Uuid>,
    receiver_golfer_id: Option<Uuid>,
    receiver_pga_id: Option<Uuid>,
    text: String,
    created_at: String,
}

impl InsertEvent {
    fn from_message(message: &Message) -> anyhow::Result<Self> {
        let fields = message.directional_fields();
        Ok(Self {
            id: message.id(),
            seq: message.seq(),
            sender_golfer_id: fields.sender_golfer_id,
            sender_pga_id: fields.sender_pga_id,
            receiver_golfer_id: fields.receiver_golfer_id,
            receiver_pga_id: fields.receiver_pga_id,
            text: message.text().to_string(),
            created_at: message.created_at().format(&Rfc3339)?,
        })
    }

    fn into_message(self) -> anyhow::Result<Message> {
        let fields = DirectionalFields {
            sender_golfer_id: self.sender_golfer_id,
            sender_pga_id: self.sender_pga_id,
            receiver_golfer_id: self.receiver_golfer_id,
            receiver_pga_id: self.receiver_pga_id,
        };
        let created_at = OffsetDateTime::parse(&self.created_at, &Rfc3339)?;
        Ok(Message::from_store(self.id, self.seq, fields, self.text, created_at)?)
    }
}

fn encode(message: &Message) -> anyhow::Result<Vec<u8>> {
    Ok(serde_json::to_vec(&InsertEvent::from_message(message)?)?)
}

fn decode(payload: &[u8]) -> anyhow::Result<Message> {
    serde_json::from_slice::<InsertEvent>(payload)?.into_message()
}

/// Table-wide insert feed shared by every process through one Redis channel.
#[derive(Debug)]
pub struct InsertFeed {
    redis: Arc<RedisClient>,
    channel: String,
    local: broadcast::Sender<FeedSignal>,
    connected: AtomicBool,
    metrics: Metrics,
}

impl InsertFeed {
    #[must_use]
    pub fn new(redis: Arc<RedisClient>, channel: String, capacity: usize) -> Self {
        let (local, _rx) = broadcast::channel(capacity.max(1));
        Self { redis, channel, local, connected: AtomicBool::new(false), metrics: Metrics::new() }
    }

    /// Publishes a committed message to every process.
    ///
    /// # Errors
    /// Returns an error if encoding or the Redis publish fails.
    #[tracing::instrument(level = "debug", skip(self, message), fields(message_id = %message.id()))]
    pub async fn publish(&self, message: &Message) -> anyhow::Result<()> {
        let payload = encode(message)?;
        match self.redis.publish(&self.channel, &payload).await {
            Ok(()) => {
                self.metrics.published_total.add(1, &[KeyValue::new("status", "sent")]);
                Ok(())
            }
            Err(e) => {
                self.metrics.published_total.add(1, &[KeyValue::new("status", "error")]);
                Err(e)
            }
        }
    }

    /// Opens a local subscription.
    ///
    /// # Errors
    /// Returns an error while the upstream Redis subscription is down.
    pub fn subscribe(&self) -> anyhow::Result<InsertSubscription> {
        if !self.connected.load(Ordering::SeqCst) {
            anyhow::bail!("insert feed is not connected");
        }
        Ok(InsertSubscription::new(self.local.subscribe()))
    }

    /// Subscribes to the Redis channel; the returned receiver is handed to [`InsertFeed::run`].
    ///
    /// # Errors
    /// Returns an error if the Redis subscription cannot be established.
    pub async fn connect(&self) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        let rx = self.redis.subscribe(&self.channel).await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    /// Forwards Redis payloads to local subscribers until shutdown or until the
    /// upstream listener gives up. Either way subscribers receive a final
    /// [`FeedSignal::Closed`] and new subscriptions are refused.
    pub async fn run(self: Arc<Self>, mut upstream: broadcast::Receiver<PubSubMessage>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                msg = upstream.recv() => match msg {
                    Ok(PubSubMessage::Payload { channel, payload }) => self.dispatch(&channel, &payload),
                    Ok(PubSubMessage::Reconnected) => {
                        tracing::info!("Insert feed reconnected; subscribers will resync");
                        let _ = self.local.send(FeedSignal::Interrupted);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(missed = n, "Insert feed dispatcher lagged");
                        let _ = self.local.send(FeedSignal::Interrupted);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::error!("Insert feed upstream closed");
                        break;
                    }
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        let _ = self.local.send(FeedSignal::Closed);
    }

    fn dispatch(&self, channel: &str, payload: &[u8]) {
        match decode(payload) {
            Ok(message) => {
                self.metrics.received_total.add(1, &[KeyValue::new("status", "ok")]);
                tracing::trace!(channel, message_id = %message.id(), "Dispatching insert event");
                let _ = self.local.send(FeedSignal::Inserted(message));
            }
            Err(e) => {
                // Malformed events are dropped rather than trusted.
                self.metrics.received_total.add(1, &[KeyValue::new("status", "malformed")]);
                tracing::warn!(channel, error = %e, "Discarding malformed insert event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::Actor;

    fn message() -> Message {
        let golfer = Actor::golfer(Uuid::new_v4());
        let pro = Actor::pga(Uuid::new_v4());
        Message::from_store(
            Uuid::new_v4(),
            42,
            DirectionalFields::encode(golfer, pro),
            "Great lesson today".to_string(),
            OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp"),
        )
        .expect("valid")
    }

    #[test]
    fn test_event_payload_preserves_message() {
        let original = message();
        let decoded = decode(&encode(&original).expect("encode")).expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_event_with_same_kind_actors_is_rejected() {
        let payload = serde_json::json!({
            "id": Uuid::new_v4(),
            "seq": 1,
            "sender_golfer_id": Uuid::new_v4(),
            "sender_pga_id": null,
            "receiver_golfer_id": Uuid::new_v4(),
            "receiver_pga_id": null,
            "text": "hi",
            "created_at": "2026-01-01T00:00:00Z",
        });
        assert!(decode(payload.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_garbage_payload_is_rejected() {
        assert!(decode(b"not json").is_err());
    }
}
