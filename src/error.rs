use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Rejections raised before anything reaches the message store.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message text is empty")]
    EmptyText,
    #[error("Messages must be exchanged between a golfer and a PGA professional")]
    InvalidPairing,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Authentication failed")]
    AuthError,
    #[error("Forbidden")]
    Forbidden,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("No professional assigned")]
    NoProfessionalAssigned,
    #[error("Counterpart lookup failed: {0}")]
    LookupFailed(String),
    #[error("Conversation load failed: {0}")]
    LoadFailed(String),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Message send failed: {0}")]
    SendFailed(String),
    #[error("Live updates unavailable: {0}")]
    SubscriptionFailed(String),
    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Whether the caller can reasonably retry the same operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LookupFailed(_) | Self::LoadFailed(_) | Self::SendFailed(_) | Self::SubscriptionFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::AuthError => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::Forbidden => {
                tracing::debug!("Counterpart outside of assignment");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::NoProfessionalAssigned => {
                tracing::debug!("No professional assigned");
                (StatusCode::NOT_FOUND, "No professional assigned".to_string())
            }
            Self::LookupFailed(msg) => {
                tracing::warn!(error = %msg, "Counterpart lookup failed");
                (StatusCode::SERVICE_UNAVAILABLE, "Counterpart lookup failed".to_string())
            }
            Self::LoadFailed(msg) => {
                tracing::warn!(error = %msg, "Conversation load failed");
                (StatusCode::SERVICE_UNAVAILABLE, "Conversation load failed".to_string())
            }
            Self::Validation(e) => {
                tracing::debug!(error = %e, "Validation failed");
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            Self::SendFailed(msg) => {
                tracing::warn!(error = %msg, "Message send failed");
                (StatusCode::SERVICE_UNAVAILABLE, "Message send failed".to_string())
            }
            Self::SubscriptionFailed(msg) => {
                tracing::warn!(error = %msg, "Live updates unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Live updates unavailable".to_string())
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
