#![allow(dead_code, unreachable_pub, missing_debug_implementations, clippy::unwrap_used, clippy::missing_panics_doc, clippy::clone_on_ref_ptr)]

use futures::{SinkExt, StreamExt};
use golfchat_server::AppBuilder;
use golfchat_server::adapters::memory::{InMemoryDirectory, InMemoryMessageStore};
use golfchat_server::api::{MgmtState, app_router, mgmt_router};
use golfchat_server::config::Config;
use golfchat_server::domain::actor::Actor;
use golfchat_server::services::auth_service::AuthService;
use serde_json::Value;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("golfchat_server=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = "test_secret".to_string();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.messaging.operation_timeout_ms = 2_000;
    config
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub config: Config,
    pub directory: Arc<InMemoryDirectory>,
    pub store: Arc<InMemoryMessageStore>,
    pub auth: AuthService,
    shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        setup_tracing();

        let directory = Arc::new(InMemoryDirectory::new());
        let store = Arc::new(InMemoryMessageStore::new(config.messaging.feed_capacity));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = AppBuilder::new(config.clone())
            .with_directory(directory.clone())
            .with_message_store(store.clone())
            .build()
            .await
            .expect("Failed to build app");

        let auth = app.services.auth_service.clone();

        let api_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api_addr = api_listener.local_addr().unwrap();
        let mgmt_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let router = app_router(app.services, shutdown_rx.clone());
        let mgmt = mgmt_router(MgmtState { health_service: app.health_service });

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(api_listener, router)
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt)
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            server_url: format!("http://{api_addr}"),
            ws_url: format!("ws://{api_addr}"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            config,
            directory,
            store,
            auth,
            shutdown_tx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Registers a golfer assigned to a fresh professional.
    pub fn golfer_with_pro(&self) -> (TestActor, TestActor) {
        let pro = self.pro();
        let golfer = self.golfer_of(&pro);
        (golfer, pro)
    }

    pub fn pro(&self) -> TestActor {
        self.actor(Actor::pga(Uuid::new_v4()))
    }

    pub fn golfer_of(&self, pro: &TestActor) -> TestActor {
        let golfer = self.actor(Actor::golfer(Uuid::new_v4()));
        self.directory.assign(golfer.id, pro.id);
        golfer
    }

    pub fn actor(&self, actor: Actor) -> TestActor {
        TestActor { id: actor.id, actor, token: self.auth.issue(actor).unwrap() }
    }

    pub async fn get_counterpart(&self, token: &str) -> reqwest::Response {
        self.client.get(format!("{}/v1/counterpart", self.server_url)).bearer_auth(token).send().await.unwrap()
    }

    pub async fn send_message(&self, token: &str, counterpart_id: Uuid, text: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/v1/conversations/{counterpart_id}/messages", self.server_url))
            .bearer_auth(token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .unwrap()
    }

    pub async fn list_messages(&self, token: &str, counterpart_id: Uuid) -> reqwest::Response {
        self.client
            .get(format!("{}/v1/conversations/{counterpart_id}/messages", self.server_url))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    /// Texts of the conversation as seen by `token`, in order.
    pub async fn texts(&self, token: &str, counterpart_id: Uuid) -> Vec<String> {
        let resp = self.list_messages(token, counterpart_id).await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        body["messages"].as_array().unwrap().iter().map(|m| m["text"].as_str().unwrap().to_string()).collect()
    }

    pub async fn connect_live(&self, token: &str, counterpart_id: Uuid) -> TestWsClient {
        self.try_connect_live(token, counterpart_id).await.expect("WebSocket handshake failed")
    }

    pub async fn try_connect_live(
        &self,
        token: &str,
        counterpart_id: Uuid,
    ) -> Result<TestWsClient, tokio_tungstenite::tungstenite::Error> {
        let url = format!("{}/v1/conversations/{counterpart_id}/live?token={token}", self.ws_url);
        let (stream, _) = tokio_tungstenite::connect_async(url).await?;
        Ok(TestWsClient { stream })
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Debug, Clone)]
pub struct TestActor {
    pub id: Uuid,
    pub actor: Actor,
    pub token: String,
}

pub struct TestWsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestWsClient {
    pub async fn send_json(&mut self, value: Value) {
        self.stream.send(WsMessage::Text(value.to_string().into())).await.unwrap();
    }

    pub async fn send_text(&mut self, text: &str) {
        self.send_json(serde_json::json!({ "text": text })).await;
    }

    pub async fn receive_frame(&mut self) -> Value {
        self.receive_frame_timeout(Duration::from_secs(5)).await.expect("Timed out waiting for frame")
    }

    pub async fn receive_frame_timeout(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.stream.next()).await.ok()??;
            match msg.ok()? {
                WsMessage::Text(text) => return Some(serde_json::from_str(text.as_str()).unwrap()),
                WsMessage::Close(_) => return None,
                _ => {}
            }
        }
    }

    /// Waits for the next frame of type `kind`, skipping others.
    pub async fn receive_kind(&mut self, kind: &str) -> Value {
        loop {
            let frame = self.receive_frame().await;
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
