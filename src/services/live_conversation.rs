use crate::domain::actor::Actor;
use crate::domain::message::{ConversationPair, Message};
use crate::error::{AppError, Result};
use crate::services::conversation_service::ConversationService;
use crate::services::store::{FeedEvent, InsertSubscription};
use opentelemetry::KeyValue;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug)]
pub enum LiveUpdate {
    /// A new message of this conversation was applied at the end of the list.
    Appended(Message),
    /// A new message was placed before already-listed ones.
    InsertedEarlier(Message),
    /// Inserts may have been missed; the history was reloaded from the store.
    Reloaded,
    /// Inserts may have been missed and the reload failed. The current list
    /// is kept and the view stays subscribed.
    ResyncFailed(AppError),
    /// The insert feed closed; the view continues in load-only mode.
    Degraded,
}

/// An open conversation view: the ordered message list, the insert
/// subscription feeding it, and the pending draft.
///
/// The subscription is released when the view is closed or dropped.
#[derive(Debug)]
pub struct LiveConversation {
    service: ConversationService,
    viewer: Actor,
    counterpart: Actor,
    pair: ConversationPair,
    messages: Vec<Message>,
    seen: HashSet<Uuid>,
    subscription: Option<InsertSubscription>,
    // Why the view is in load-only mode.
    feed_error: Option<AppError>,
    draft: String,
    // Set while a gap-triggered reload is pending so a cancelled
    // `next_update` resumes it.
    stale: bool,
}

impl LiveConversation {
    pub(crate) fn new(
        service: ConversationService,
        viewer: Actor,
        counterpart: Actor,
        pair: ConversationPair,
        history: Vec<Message>,
        subscription: Result<InsertSubscription>,
    ) -> Self {
        let (subscription, feed_error) = match subscription {
            Ok(subscription) => (Some(subscription), None),
            Err(e) => (None, Some(e)),
        };
        let mut view = Self {
            service,
            viewer,
            counterpart,
            pair,
            messages: Vec::new(),
            seen: HashSet::new(),
            subscription,
            feed_error,
            draft: String::new(),
            stale: false,
        };
        view.replace_history(history);
        view
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub const fn pair(&self) -> ConversationPair {
        self.pair
    }

    #[must_use]
    pub const fn viewer(&self) -> Actor {
        self.viewer
    }

    #[must_use]
    pub const fn counterpart(&self) -> Actor {
        self.counterpart
    }

    /// Whether live updates are flowing; `false` means load-only mode.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// The subscription failure that put the view in load-only mode.
    #[must_use]
    pub const fn feed_error(&self) -> Option<&AppError> {
        self.feed_error.as_ref()
    }

    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Sends the pending draft as the viewer.
    ///
    /// The draft is cleared on success and kept on failure. The stored message
    /// is not added to the list here; it arrives through the insert feed.
    ///
    /// # Errors
    /// Any error of [`ConversationService::send`].
    pub async fn send_draft(&mut self) -> Result<Option<Message>> {
        let result = self.service.send(self.viewer, self.counterpart, &self.draft).await;
        if result.is_ok() {
            self.draft.clear();
        }
        result
    }

    /// Waits for the next change to the message list.
    ///
    /// Returns `None` once the view is in load-only mode.
    pub async fn next_update(&mut self) -> Option<LiveUpdate> {
        loop {
            if self.stale && self.subscription.is_some() {
                return Some(self.resync().await);
            }
            let event = self.subscription.as_mut()?.recv().await;
            match event {
                FeedEvent::Inserted(message) => match self.apply(message) {
                    Some(Placement::End(applied)) => return Some(LiveUpdate::Appended(applied)),
                    Some(Placement::Earlier(applied)) => return Some(LiveUpdate::InsertedEarlier(applied)),
                    None => {}
                },
                FeedEvent::Gap => {
                    self.stale = true;
                    return Some(self.resync().await);
                }
                FeedEvent::Closed => {
                    tracing::warn!(pair = ?self.pair, "Insert feed closed, continuing in load-only mode");
                    self.feed_closed();
                    return Some(LiveUpdate::Degraded);
                }
            }
        }
    }

    /// Reloads the history from the store. In load-only mode this first tries
    /// to re-establish the insert subscription.
    ///
    /// # Errors
    /// Returns `AppError::LoadFailed` if the store query fails; the current
    /// list is left untouched.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(live = self.is_live()))]
    pub async fn refresh(&mut self) -> Result<()> {
        if self.subscription.is_none() {
            match self.service.subscribe().await {
                Ok(subscription) => {
                    self.subscription = Some(subscription);
                    self.feed_error = None;
                }
                Err(e) => self.feed_error = Some(e),
            }
        }
        self.reload().await?;
        self.drain_buffered().await
    }

    /// Releases the insert subscription.
    pub fn close(self) {
        drop(self);
    }

    /// Applies events that were buffered while a load was in flight.
    pub(crate) async fn drain_buffered(&mut self) -> Result<()> {
        loop {
            let Some(event) = self.subscription.as_mut().and_then(InsertSubscription::try_recv) else {
                return Ok(());
            };
            match event {
                FeedEvent::Inserted(message) => {
                    self.apply(message);
                }
                FeedEvent::Gap => self.reload().await?,
                FeedEvent::Closed => {
                    self.feed_closed();
                    return Ok(());
                }
            }
        }
    }

    fn feed_closed(&mut self) {
        self.subscription = None;
        self.feed_error = Some(AppError::SubscriptionFailed("insert feed closed".to_string()));
    }

    async fn resync(&mut self) -> LiveUpdate {
        let result = self.reload().await;
        self.stale = false;
        match result {
            Ok(()) => LiveUpdate::Reloaded,
            Err(e) => LiveUpdate::ResyncFailed(e),
        }
    }

    async fn reload(&mut self) -> Result<()> {
        let history = self.service.load_pair(self.pair).await?;
        self.replace_history(history);
        self.stale = false;
        Ok(())
    }

    fn replace_history(&mut self, history: Vec<Message>) {
        self.seen = history.iter().map(Message::id).collect();
        self.messages = history;
    }

    /// Inserts `message` in conversation order if it belongs to this pair and
    /// has not been seen yet.
    fn apply(&mut self, message: Message) -> Option<Placement> {
        let metrics = &self.service.metrics;
        if !self.pair.contains(&message) {
            metrics.live_events_total.add(1, &[KeyValue::new("outcome", "other_pair")]);
            return None;
        }
        if !self.seen.insert(message.id()) {
            metrics.live_events_total.add(1, &[KeyValue::new("outcome", "duplicate")]);
            return None;
        }

        let key = message.order_key();
        let index = self.messages.partition_point(|existing| existing.order_key() <= key);
        let at_end = index == self.messages.len();
        if !at_end {
            tracing::debug!(message_id = %message.id(), "Insert event arrived out of order");
        }
        self.messages.insert(index, message.clone());
        metrics.live_events_total.add(1, &[KeyValue::new("outcome", "applied")]);
        Some(if at_end { Placement::End(message) } else { Placement::Earlier(message) })
    }
}

enum Placement {
    End(Message),
    Earlier(Message),
}

impl Drop for LiveConversation {
    fn drop(&mut self) {
        tracing::trace!(pair = ?self.pair, live = self.subscription.is_some(), "Closing live conversation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryMessageStore;
    use crate::domain::message::{DirectionalFields, NewMessage};
    use crate::services::store::{FeedSignal, MessageStore, StoreError};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use time::OffsetDateTime;
    use tokio::sync::{Mutex, Notify, broadcast};

    fn service(store: Arc<dyn MessageStore>) -> ConversationService {
        ConversationService::new(store, Duration::from_secs(1), 4000)
    }

    fn participants() -> (Actor, Actor) {
        (Actor::golfer(Uuid::new_v4()), Actor::pga(Uuid::new_v4()))
    }

    fn message_at(sender: Actor, receiver: Actor, seq: i64, unix: i64) -> Message {
        Message::from_store(
            Uuid::new_v4(),
            seq,
            DirectionalFields::encode(sender, receiver),
            format!("message {seq}"),
            OffsetDateTime::from_unix_timestamp(unix).expect("timestamp"),
        )
        .expect("valid")
    }

    /// A store whose feed and history are driven by the test.
    #[derive(Debug)]
    struct ScriptedStore {
        feed: broadcast::Sender<FeedSignal>,
        history: Mutex<Vec<Message>>,
        load_gate: Notify,
        gated: bool,
        feed_down: AtomicBool,
    }

    impl ScriptedStore {
        fn new(gated: bool) -> Self {
            let (feed, _rx) = broadcast::channel(16);
            Self {
                feed,
                history: Mutex::new(Vec::new()),
                load_gate: Notify::new(),
                gated,
                feed_down: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl MessageStore for ScriptedStore {
        async fn insert_message(&self, _message: &NewMessage) -> std::result::Result<Message, StoreError> {
            Err(StoreError::Unavailable(anyhow::anyhow!("read-only")))
        }

        async fn query_messages(&self, _pair: ConversationPair) -> std::result::Result<Vec<Message>, StoreError> {
            if self.gated {
                self.load_gate.notified().await;
            }
            Ok(self.history.lock().await.clone())
        }

        async fn subscribe_inserts(&self) -> std::result::Result<InsertSubscription, StoreError> {
            if self.feed_down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable(anyhow::anyhow!("feed down")));
            }
            Ok(InsertSubscription::new(self.feed.subscribe()))
        }
    }

    #[tokio::test]
    async fn test_live_insert_is_appended_once() {
        let store = Arc::new(InMemoryMessageStore::default());
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let mut view = service.open(golfer, pro).await.expect("open");
        assert!(view.is_live());
        assert!(view.messages().is_empty());

        let sent = service.send(pro, golfer, "See you Thursday").await.expect("send").expect("stored");

        match view.next_update().await {
            Some(LiveUpdate::Appended(message)) => assert_eq!(message, sent),
            other => unreachable!("unexpected update: {other:?}"),
        }
        assert_eq!(view.messages(), std::slice::from_ref(&sent));
    }

    #[tokio::test]
    async fn test_inserts_for_other_pairs_are_filtered() {
        let store = Arc::new(InMemoryMessageStore::default());
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (g1, pro) = participants();
        let g2 = Actor::golfer(Uuid::new_v4());

        let mut view = service.open(g1, pro).await.expect("open");

        service.send(g2, pro, "Not for g1").await.expect("send");
        let mine = service.send(pro, g1, "For g1").await.expect("send").expect("stored");

        match view.next_update().await {
            Some(LiveUpdate::Appended(message)) => assert_eq!(message, mine),
            other => unreachable!("unexpected update: {other:?}"),
        }
        assert_eq!(view.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_inserts_racing_initial_load_are_replayed_without_duplicates() {
        let store = Arc::new(ScriptedStore::new(true));
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let early = message_at(golfer, pro, 1, 1_000);
        let racing = message_at(pro, golfer, 2, 2_000);
        store.history.lock().await.push(early.clone());

        let opener = {
            let service = service.clone();
            tokio::spawn(async move { service.open(golfer, pro).await })
        };

        // Wait until the view has subscribed, then race an insert ahead of the load.
        while store.feed.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        store.history.lock().await.push(racing.clone());
        store.feed.send(FeedSignal::Inserted(racing.clone())).expect("subscriber present");
        store.feed.send(FeedSignal::Inserted(early.clone())).expect("subscriber present");
        store.load_gate.notify_one();

        let view = opener.await.expect("join").expect("open");
        assert_eq!(view.messages(), &[early, racing]);
    }

    #[tokio::test]
    async fn test_out_of_order_insert_is_placed_by_timestamp() {
        let store = Arc::new(ScriptedStore::new(false));
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let first = message_at(golfer, pro, 1, 1_000);
        let third = message_at(golfer, pro, 3, 3_000);
        store.history.lock().await.extend([first.clone(), third.clone()]);

        let mut view = service.open(golfer, pro).await.expect("open");

        let second = message_at(pro, golfer, 2, 2_000);
        store.feed.send(FeedSignal::Inserted(second.clone())).expect("subscriber present");
        match view.next_update().await {
            Some(LiveUpdate::InsertedEarlier(message)) => assert_eq!(message, second),
            other => unreachable!("unexpected update: {other:?}"),
        }

        assert_eq!(view.messages(), &[first, second, third.clone()]);

        let fourth = message_at(golfer, pro, 4, 4_000);
        store.feed.send(FeedSignal::Inserted(fourth.clone())).expect("subscriber present");
        match view.next_update().await {
            Some(LiveUpdate::Appended(message)) => assert_eq!(message, fourth),
            other => unreachable!("unexpected update: {other:?}"),
        }
        assert_eq!(view.messages().last(), Some(&fourth));
    }

    #[tokio::test]
    async fn test_gap_triggers_reload() {
        let store = Arc::new(ScriptedStore::new(false));
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let mut view = service.open(golfer, pro).await.expect("open");
        assert!(view.messages().is_empty());

        let missed = message_at(golfer, pro, 1, 1_000);
        store.history.lock().await.push(missed.clone());
        store.feed.send(FeedSignal::Interrupted).expect("subscriber present");

        assert!(matches!(view.next_update().await, Some(LiveUpdate::Reloaded)));
        assert_eq!(view.messages(), &[missed]);
    }

    #[tokio::test]
    async fn test_cancelled_reload_resumes_on_next_update() {
        let store = Arc::new(ScriptedStore::new(true));
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        store.load_gate.notify_one();
        let mut view = service.open(golfer, pro).await.expect("open");

        store.feed.send(FeedSignal::Interrupted).expect("subscriber present");
        let pending = tokio::time::timeout(Duration::from_millis(50), view.next_update()).await;
        assert!(pending.is_err(), "reload should still be waiting on the store");

        let missed = message_at(golfer, pro, 1, 1_000);
        store.history.lock().await.push(missed.clone());
        store.load_gate.notify_one();

        assert!(matches!(view.next_update().await, Some(LiveUpdate::Reloaded)));
        assert_eq!(view.messages(), &[missed]);
    }

    #[tokio::test]
    async fn test_closed_feed_degrades_to_load_only() {
        let store = Arc::new(InMemoryMessageStore::default());
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let orphaned = {
            let scripted = ScriptedStore::new(false);
            let subscription = scripted.subscribe_inserts().await.expect("subscribe");
            drop(scripted);
            subscription
        };
        let mut view = LiveConversation::new(
            service.clone(),
            golfer,
            pro,
            ConversationPair::between(golfer, pro).expect("pair"),
            Vec::new(),
            Ok(orphaned),
        );

        assert!(matches!(view.next_update().await, Some(LiveUpdate::Degraded)));
        assert!(!view.is_live());
        assert!(matches!(view.feed_error(), Some(AppError::SubscriptionFailed(_))));
        assert!(view.next_update().await.is_none());

        // Manual refresh re-subscribes and picks up messages sent meanwhile.
        let sent = service.send(golfer, pro, "Still there?").await.expect("send").expect("stored");
        view.refresh().await.expect("refresh");
        assert!(view.is_live());
        assert!(view.feed_error().is_none());
        assert_eq!(view.messages(), &[sent]);
    }

    #[tokio::test]
    async fn test_feed_that_stops_after_interruption_degrades_view() {
        let store = Arc::new(ScriptedStore::new(false));
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let mut view = service.open(golfer, pro).await.expect("open");
        assert!(view.is_live());

        // The feed's sender stays alive; only the signals tell the view it stopped.
        store.feed_down.store(true, Ordering::SeqCst);
        store.feed.send(FeedSignal::Interrupted).expect("subscriber present");
        store.feed.send(FeedSignal::Closed).expect("subscriber present");

        assert!(matches!(view.next_update().await, Some(LiveUpdate::Reloaded)));
        assert!(matches!(view.next_update().await, Some(LiveUpdate::Degraded)));
        assert!(!view.is_live());
        assert!(view.next_update().await.is_none());

        let missed = message_at(golfer, pro, 1, 1_000);
        store.history.lock().await.push(missed.clone());
        view.refresh().await.expect("refresh");
        assert!(!view.is_live());
        assert!(matches!(view.feed_error(), Some(AppError::SubscriptionFailed(_))));
        assert_eq!(view.messages(), &[missed]);
    }

    #[tokio::test]
    async fn test_failed_draft_send_preserves_text() {
        let store = Arc::new(InMemoryMessageStore::default());
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let mut view = service.open(golfer, pro).await.expect("open");
        view.set_draft("Great lesson today");

        store.set_offline(true);
        assert!(matches!(view.send_draft().await, Err(AppError::SendFailed(_))));
        assert_eq!(view.draft(), "Great lesson today");

        store.set_offline(false);
        let sent = view.send_draft().await.expect("send").expect("stored");
        assert_eq!(view.draft(), "");
        // Not echoed locally; delivered by the feed.
        assert!(view.messages().is_empty());

        match view.next_update().await {
            Some(LiveUpdate::Appended(message)) => assert_eq!(message, sent),
            other => unreachable!("unexpected update: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_releases_subscription() {
        let store = Arc::new(ScriptedStore::new(false));
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let view = service.open(golfer, pro).await.expect("open");
        assert_eq!(store.feed.receiver_count(), 1);

        view.close();
        assert_eq!(store.feed.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_open_releases_subscription() {
        let store = Arc::new(ScriptedStore::new(true));
        let service = service(Arc::clone(&store) as Arc<dyn MessageStore>);
        let (golfer, pro) = participants();

        let opener = {
            let service = service.clone();
            tokio::spawn(async move { service.open(golfer, pro).await })
        };
        while store.feed.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        opener.abort();
        assert!(opener.await.expect_err("aborted").is_cancelled());
        assert_eq!(store.feed.receiver_count(), 0);
    }
}
