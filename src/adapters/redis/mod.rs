use crate::config::PubSubConfig;
use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use futures::StreamExt;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::Instrument;

pub mod insert_feed;

pub use insert_feed::InsertFeed;

#[derive(Debug, Clone)]
pub enum PubSubMessage {
    Payload { channel: String, payload: Vec<u8> },
    /// The listener lost its connection and has resubscribed.
    Reconnected,
}

type Listeners = Arc<DashMap<String, broadcast::Sender<PubSubMessage>>>;

/// Redis connection shared by the insert feed and the readiness probe.
///
/// One background listener runs per subscribed channel. Its receivers are
/// closed once the listener stops, either on shutdown or after the
/// reconnect attempts are exhausted.
#[derive(Debug)]
pub struct RedisClient {
    client: redis::Client,
    connection: redis::aio::ConnectionManager,
    listeners: Listeners,
    shutdown: watch::Receiver<bool>,
    channel_capacity: usize,
    config: PubSubConfig,
}

impl RedisClient {
    /// Connects to Redis.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn new(
        config: &PubSubConfig,
        channel_capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection = client.get_connection_manager().await?;

        Ok(Arc::new(Self {
            client,
            connection,
            listeners: Arc::new(DashMap::new()),
            shutdown,
            channel_capacity: channel_capacity.max(1),
            config: config.clone(),
        }))
    }

    /// Subscribes to `channel`, starting its listener on first use.
    ///
    /// # Errors
    /// Returns an error if the listener gives up before its first subscription succeeds.
    pub async fn subscribe(&self, channel: &str) -> anyhow::Result<broadcast::Receiver<PubSubMessage>> {
        if let Some(tx) = self.listeners.get(channel) {
            return Ok(tx.subscribe());
        }

        let (tx, rx) = broadcast::channel(self.channel_capacity);
        self.listeners.insert(channel.to_string(), tx.clone());

        let (ready_tx, ready_rx) = oneshot::channel();
        let listener = ChannelListener {
            client: self.client.clone(),
            channel: channel.to_string(),
            tx,
            shutdown: self.shutdown.clone(),
            listeners: Arc::clone(&self.listeners),
            min_backoff: Duration::from_secs(self.config.min_backoff_secs),
            max_backoff: Duration::from_secs(self.config.max_backoff_secs),
        };
        tokio::spawn(listener.run(ready_tx).instrument(tracing::debug_span!("pubsub_listener", channel = %channel)));

        // Dropped without a value if the listener gives up.
        ready_rx.await.map_err(|_| anyhow::anyhow!("pubsub listener for {channel} failed to subscribe"))?;

        Ok(rx)
    }

    /// Publishes a payload on a channel.
    ///
    /// # Errors
    /// Returns an error if the publish fails.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut conn = self.connection.clone();
        conn.publish::<_, _, i64>(channel, payload).await?;
        Ok(())
    }

    /// Pings the Redis server to check connectivity.
    ///
    /// # Errors
    /// Returns an error if the ping fails.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

struct ChannelListener {
    client: redis::Client,
    channel: String,
    tx: broadcast::Sender<PubSubMessage>,
    shutdown: watch::Receiver<bool>,
    listeners: Listeners,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl ChannelListener {
    async fn run(mut self, ready_tx: oneshot::Sender<()>) {
        let mut ready_tx = Some(ready_tx);

        while let Some(pubsub) = self.connect().await {
            tracing::info!(channel = %self.channel, "Subscribed to pubsub channel");
            match ready_tx.take() {
                Some(ready) => {
                    let _ = ready.send(());
                }
                None => {
                    let _ = self.tx.send(PubSubMessage::Reconnected);
                }
            }

            if !self.forward(pubsub).await {
                break;
            }
        }

        self.listeners.remove(&self.channel);
    }

    /// Subscribes with exponential backoff; `None` once the attempts are exhausted.
    async fn connect(&self) -> Option<redis::aio::PubSub> {
        let backoff = ExponentialBuilder::default().with_min_delay(self.min_backoff).with_max_delay(self.max_backoff);

        let result = (|| async {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.subscribe(&self.channel).await?;
            Ok::<_, redis::RedisError>(pubsub)
        })
        .retry(backoff)
        .notify(|e, delay| {
            tracing::warn!(error = %e, retry_in = ?delay, "Pubsub subscribe failed");
        })
        .await;

        match result {
            Ok(pubsub) => Some(pubsub),
            Err(e) => {
                tracing::error!(error = %e, channel = %self.channel, "Pubsub subscription failed after retries");
                None
            }
        }
    }

    /// Forwards messages until the connection drops (`true`) or shutdown (`false`).
    async fn forward(&mut self, pubsub: redis::aio::PubSub) -> bool {
        let mut messages = pubsub.into_on_message();
        loop {
            let msg = tokio::select! {
                _ = self.shutdown.changed() => return false,
                msg = messages.next() => msg,
            };
            let Some(msg) = msg else {
                tracing::warn!(channel = %self.channel, "Pubsub connection lost, reconnecting");
                return !*self.shutdown.borrow();
            };
            let _ = self.tx.send(PubSubMessage::Payload {
                channel: msg.get_channel_name().to_string(),
                payload: msg.get_payload().unwrap_or_default(),
            });
        }
    }
}
