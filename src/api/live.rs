use crate::api::AppState;
use crate::api::schemas::conversations::MessageResponse;
use crate::api::schemas::live::{ClientFrame, ServerFrame, WsParams};
use crate::error::AppError;
use crate::services::live_conversation::{LiveConversation, LiveUpdate};
use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade, close_code},
    },
    http::Extensions,
    response::{IntoResponse, Response},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use opentelemetry::{global, metrics::UpDownCounter};
use tokio::sync::watch;
use tower_http::request_id::RequestId;
use tracing::Instrument;
use uuid::Uuid;

type WsSink = SplitSink<WebSocket, WsMessage>;

/// Upgrades to a live conversation with `counterpart_id`.
///
/// The token travels as a query parameter because browsers cannot set headers
/// on WebSocket handshakes. Authorization and the initial load happen before
/// the upgrade so failures surface as plain HTTP errors.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(counterpart_id): Path<Uuid>,
    Query(params): Query<WsParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> Response {
    let request_id = extensions
        .get::<RequestId>()
        .map(|id| id.header_value().to_str().unwrap_or_default().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let session = match state.auth_service.verify(&params.token) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake failed: invalid token");
            return e.into_response();
        }
    };

    let view = async {
        let counterpart = state.counterpart_service.authorize(session.actor(), counterpart_id).await?;
        state.conversation_service.open(session.actor(), counterpart).await
    };

    match view.await {
        Ok(view) => {
            let shutdown_rx = state.shutdown_rx.clone();
            ws.on_upgrade(move |socket| handle_socket(socket, view, shutdown_rx, request_id))
        }
        Err(e) => e.into_response(),
    }
}

fn active_connections() -> UpDownCounter<i64> {
    global::meter("golfchat-server")
        .i64_up_down_counter("golfchat_live_connections")
        .with_description("Number of open live conversation sockets")
        .build()
}

async fn handle_socket(socket: WebSocket, mut view: LiveConversation, mut shutdown_rx: watch::Receiver<bool>, request_id: String) {
    let span = tracing::info_span!(
        "live_conversation",
        request_id = %request_id,
        viewer = %view.viewer(),
        counterpart = %view.counterpart(),
        otel.kind = "server",
    );

    async move {
        let active_connections = active_connections();
        active_connections.add(1, &[]);
        tracing::info!(live = view.is_live(), "Live conversation opened");

        let (mut ws_sink, mut ws_stream) = socket.split();

        if send_frame(&mut ws_sink, &history_frame(&view)).await.is_ok() {
            if !view.is_live() {
                let _ = send_frame(&mut ws_sink, &degraded_frame(&view)).await;
            }

            loop {
                if *shutdown_rx.borrow() {
                    tracing::info!("Shutdown signal received, closing WebSocket");
                    let _ = ws_sink
                        .send(WsMessage::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: "Server shutting down".into(),
                        })))
                        .await;
                    break;
                }

                let frame = tokio::select! {
                    biased;

                    res = shutdown_rx.changed() => {
                        if res.is_err() {
                            break;
                        }
                        continue;
                    }

                    msg = ws_stream.next() => match msg {
                        Some(Ok(WsMessage::Text(text))) => handle_client_frame(&mut view, text.as_str()).await,
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WebSocket error");
                            break;
                        }
                        Some(Ok(_)) => None,
                    },

                    update = view.next_update(), if view.is_live() => Some(update_frame(&view, update)),
                };

                if let Some(frame) = frame
                    && send_frame(&mut ws_sink, &frame).await.is_err()
                {
                    break;
                }
            }
        }

        let _ = ws_sink.close().await;
        view.close();
        active_connections.add(-1, &[]);
        tracing::info!("Live conversation closed");
    }
    .instrument(span)
    .await;
}

async fn handle_client_frame(view: &mut LiveConversation, text: &str) -> Option<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparseable client frame");
            return Some(error_frame(&AppError::BadRequest("Unrecognized frame".to_string())));
        }
    };

    match frame {
        ClientFrame::Send { text } => {
            view.set_draft(text);
            match view.send_draft().await {
                // Without the feed the sender would never see their own message.
                Ok(Some(_)) if !view.is_live() => Some(refresh(view).await),
                Ok(_) => None,
                Err(e) => Some(error_frame(&e)),
            }
        }
        ClientFrame::Refresh { refresh: true } => Some(refresh(view).await),
        ClientFrame::Refresh { refresh: false } => None,
    }
}

async fn refresh(view: &mut LiveConversation) -> ServerFrame {
    match view.refresh().await {
        Ok(()) => history_frame(view),
        Err(e) => error_frame(&e),
    }
}

fn update_frame(view: &LiveConversation, update: Option<LiveUpdate>) -> ServerFrame {
    match update {
        Some(LiveUpdate::Appended(message)) => match MessageResponse::try_from(&message) {
            Ok(message) => ServerFrame::Message { message },
            Err(e) => error_frame(&e),
        },
        // Clients append message frames, so anything placed earlier resends the list.
        Some(LiveUpdate::InsertedEarlier(_) | LiveUpdate::Reloaded) => history_frame(view),
        Some(LiveUpdate::ResyncFailed(e)) => error_frame(&e),
        Some(LiveUpdate::Degraded) | None => degraded_frame(view),
    }
}

fn degraded_frame(view: &LiveConversation) -> ServerFrame {
    match view.feed_error() {
        Some(e) => ServerFrame::Degraded { error: e.to_string(), retryable: e.is_retryable() },
        None => ServerFrame::Degraded { error: "Live updates unavailable".to_string(), retryable: true },
    }
}

fn history_frame(view: &LiveConversation) -> ServerFrame {
    match MessageResponse::list(view.messages()) {
        Ok(messages) => ServerFrame::History { live: view.is_live(), messages },
        Err(e) => error_frame(&e),
    }
}

fn error_frame(error: &AppError) -> ServerFrame {
    ServerFrame::Error { error: error.to_string(), retryable: error.is_retryable() }
}

async fn send_frame(sink: &mut WsSink, frame: &ServerFrame) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode live frame");
            return Ok(());
        }
    };
    sink.send(WsMessage::Text(json.into())).await
}
