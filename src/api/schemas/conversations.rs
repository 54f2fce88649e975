use crate::domain::actor::Actor;
use crate::domain::message::Message;
use crate::error::AppError;
use crate::services::counterpart_service::Counterpart;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CounterpartResponse {
    Professional { professional_id: Uuid },
    Candidates { golfer_ids: Vec<Uuid> },
}

impl From<Counterpart> for CounterpartResponse {
    fn from(counterpart: Counterpart) -> Self {
        match counterpart {
            Counterpart::Professional(professional_id) => Self::Professional { professional_id },
            Counterpart::Candidates(golfer_ids) => Self::Candidates { golfer_ids },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender: Actor,
    pub receiver: Actor,
    pub text: String,
    /// RFC 3339 timestamp assigned by the store.
    pub created_at: String,
}

impl TryFrom<&Message> for MessageResponse {
    type Error = AppError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        let created_at = message.created_at().format(&Rfc3339).map_err(|e| {
            tracing::error!(error = %e, message_id = %message.id(), "Unformattable message timestamp");
            AppError::Internal
        })?;

        Ok(Self {
            id: message.id(),
            sender: message.sender(),
            receiver: message.receiver(),
            text: message.text().to_string(),
            created_at,
        })
    }
}

impl MessageResponse {
    /// Converts an ordered history, preserving order.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if a timestamp cannot be formatted.
    pub fn list(messages: &[Message]) -> Result<Vec<Self>, AppError> {
        messages.iter().map(Self::try_from).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub counterpart: Actor,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}
