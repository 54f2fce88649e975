use crate::services::auth_service::AuthService;
use crate::services::conversation_service::ConversationService;
use crate::services::counterpart_service::CounterpartService;
use crate::services::health_service::HealthService;
use axum::body::Body;
use axum::http::Request;
use axum::{Router, routing::get};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod conversations;
pub mod health;
pub mod live;
pub mod middleware;
pub mod schemas;

#[derive(Clone, Debug)]
pub struct AppState {
    pub auth_service: AuthService,
    pub counterpart_service: CounterpartService,
    pub conversation_service: ConversationService,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub auth_service: AuthService,
    pub counterpart_service: CounterpartService,
    pub conversation_service: ConversationService,
}

/// Configures and returns the primary application router.
pub fn app_router(services: ServiceContainer, shutdown_rx: tokio::sync::watch::Receiver<bool>) -> Router {
    let state = AppState {
        auth_service: services.auth_service,
        counterpart_service: services.counterpart_service,
        conversation_service: services.conversation_service,
        shutdown_rx,
    };

    let api_routes = Router::new()
        .route("/counterpart", get(conversations::get_counterpart))
        .route(
            "/conversations/{counterpartId}/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route("/conversations/{counterpartId}/live", get(live::websocket_handler));

    Router::new()
        .nest("/v1", api_routes)
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(move |request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .map(|id| id.header_value().to_str().unwrap_or_default())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                        "actor" = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(
            axum::http::HeaderName::from_static("x-request-id"),
            middleware::MakeRequestUuidOrHeader,
        ))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
