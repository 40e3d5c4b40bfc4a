//! Chat payloads and broker destinations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Destination every chat message is published to.
pub const PUBLISH_DESTINATION: &str = "/app/chat/message";

const ROOM_TOPIC_PREFIX: &str = "/topic/chat/room/";

/// Broker topic a room's messages are fanned out on.
pub fn room_topic(room_id: &str) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room_id}")
}

pub fn validate_room_id(room_id: &str) -> Result<()> {
    if room_id.trim().is_empty() {
        return Err(ClientError::validation("room id must not be empty"));
    }
    if room_id.contains(['/', '\n', '\r', '\0']) {
        return Err(ClientError::validation(format!(
            "room id {room_id:?} contains a reserved character"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_id: String,
    pub sender_id: String,
    pub body: String,
    /// Stamped by the broker; absent on messages we compose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn new(
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            body: body.into(),
            timestamp: None,
        }
    }
}
