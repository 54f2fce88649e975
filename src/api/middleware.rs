use crate::api::AppState;
use crate::domain::session::Session;
use crate::error::AppError;
use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, Request, header, request::Parts},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// The verified session of the caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthSession(pub Session);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts.headers.get(header::AUTHORIZATION).ok_or(AppError::AuthError)?;

        let auth_str = auth_header.to_str().map_err(|_| AppError::AuthError)?;
        let token = auth_str.strip_prefix("Bearer ").ok_or(AppError::AuthError)?;

        let session = state.auth_service.verify(token)?;
        tracing::Span::current().record("actor", tracing::field::display(session.actor()));

        Ok(Self(session))
    }
}

/// Keeps a caller-supplied `x-request-id`, otherwise generates a UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidOrHeader;

impl MakeRequestId for MakeRequestUuidOrHeader {
    fn make_request_id<B>(&mut self, request: &Request<B>) -> Option<RequestId> {
        if let Some(existing) = request.headers().get("x-request-id") {
            return Some(RequestId::new(existing.clone()));
        }

        HeaderValue::from_str(&Uuid::new_v4().to_string()).ok().map(RequestId::new)
    }
}
