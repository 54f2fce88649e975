use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use crate::services::health_service::Probe;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks connectivity to the database and `PubSub`.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (db_probe, pubsub_probe) = tokio::join!(state.health_service.check_db(), state.health_service.check_pubsub());

    let mut status_code = StatusCode::OK;
    for (component, probe) in [("database", &db_probe), ("pubsub", &pubsub_probe)] {
        if let Probe::Failed(e) = probe {
            tracing::warn!(error = %e, component, "Readiness probe failed");
            status_code = StatusCode::SERVICE_UNAVAILABLE;
        }
    }

    let response = HealthResponse {
        status: if status_code == StatusCode::OK { "ok" } else { "error" }.to_string(),
        database: db_probe.as_str().to_string(),
        pubsub: pubsub_probe.as_str().to_string(),
    };

    (status_code, Json(response))
}
