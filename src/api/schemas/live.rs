use crate::api::schemas::conversations::MessageResponse;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// Frames pushed to a live conversation socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// The full ordered history; sent on open and after every reload.
    History { live: bool, messages: Vec<MessageResponse> },
    Message { message: MessageResponse },
    /// Live updates stopped; the client may send a refresh frame.
    Degraded { error: String, retryable: bool },
    Error { error: String, retryable: bool },
}

/// Frames accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Send { text: String },
    Refresh { refresh: bool },
}
