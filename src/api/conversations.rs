use crate::api::AppState;
use crate::api::middleware::AuthSession;
use crate::api::schemas::conversations::{
    ConversationResponse, CounterpartResponse, MessageResponse, SendMessageRequest,
};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

/// Resolves who the caller can talk to.
///
/// # Errors
/// Returns `AppError::NoProfessionalAssigned` for a golfer without a professional.
/// Returns `AppError::LookupFailed` if the directory is unavailable.
pub async fn get_counterpart(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> Result<Json<CounterpartResponse>> {
    let counterpart = state.counterpart_service.resolve(session.actor()).await?;
    Ok(Json(counterpart.into()))
}

/// Returns the ordered history between the caller and `counterpart_id`.
///
/// # Errors
/// Returns `AppError::Forbidden` if the two are not assigned to each other.
/// Returns `AppError::LoadFailed` if the store is unavailable.
pub async fn list_messages(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(counterpart_id): Path<Uuid>,
) -> Result<Json<ConversationResponse>> {
    let counterpart = state.counterpart_service.authorize(session.actor(), counterpart_id).await?;
    let messages = state.conversation_service.load(session.actor(), counterpart).await?;

    Ok(Json(ConversationResponse { counterpart, messages: MessageResponse::list(&messages)? }))
}

/// Sends a message to `counterpart_id`.
///
/// Responds `201` with the stored message, or `204` when the text was blank
/// and nothing was stored.
///
/// # Errors
/// Returns `AppError::Forbidden` if the two are not assigned to each other.
/// Returns `AppError::SendFailed` if the store rejects the insert.
pub async fn send_message(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(counterpart_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Response> {
    let counterpart = state.counterpart_service.authorize(session.actor(), counterpart_id).await?;

    match state.conversation_service.send(session.actor(), counterpart, &payload.text).await? {
        Some(message) => Ok((StatusCode::CREATED, Json(MessageResponse::try_from(&message)?)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
