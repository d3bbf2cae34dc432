use crate::service::StatusSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client → Server message types
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    RequestStatus,
}

/// Server → Client message types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, right after the connection is accepted
    InitialStatus(StatusSnapshot),
    /// After each update cycle, and in reply to `request_status`
    StatusUpdate(StatusSnapshot),
    Pong { timestamp: DateTime<Utc> },
    Error { error: String },
}

impl ServerMessage {
    pub fn pong() -> Self {
        ServerMessage::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
        }
    }
}
