use serde_json::Value;

use crate::error::Result;
use crate::http::ApiClient;

use super::path_segment;

/// Cursor meaning "the most recent page".
pub const LATEST_CURSOR: &str = "latest";

/// `GET /api/chat/{roomId}/{cursor}`: stored history of a room.
pub async fn chat_history(api: &ApiClient, room_id: &str, cursor: Option<&str>) -> Result<Value> {
    let room = path_segment("room id", room_id)?;
    let cursor = path_segment("cursor", cursor.unwrap_or(LATEST_CURSOR))?;
    api.get(&format!("/api/chat/{room}/{cursor}")).await
}
