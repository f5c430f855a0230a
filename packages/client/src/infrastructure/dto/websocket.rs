//! Realtime frame DTOs.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

/// Inbound envelope. `data` is decoded once the event name is known.
#[derive(Debug, Deserialize)]
pub struct IncomingFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outbound envelope
#[derive(Debug, Serialize)]
pub struct OutgoingFrame<T> {
    pub event: &'static str,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub user_type: String,
    pub content: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message: Option<ReplyPreviewDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreviewDto {
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// `join_room`, `typing` and `stop_typing` share this shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceDto {
    pub room_id: String,
    pub user_id: String,
    pub user_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeenDto {
    pub room_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_type: Option<String>,
    pub last_message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRoomDto {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageDto {
    pub room_id: String,
    pub user_id: String,
    pub user_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomJoinedDto {
    pub room_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRoomDto {
    #[serde(default, alias = "_id")]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthErrorDto {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageErrorDto {
    #[serde(default)]
    pub error: String,
}
