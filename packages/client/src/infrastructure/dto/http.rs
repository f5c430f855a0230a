//! REST request/response DTOs.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/public/rooms`
#[derive(Debug, Clone, Serialize)]
pub struct EnsureRoomRequest<'a> {
    pub customer_id: &'a str,
    pub customer_name: &'a str,
}

/// Body of `GET /api/admin/rooms/{room_id}/last-seen` (the endpoint may answer `null`)
#[derive(Debug, Clone, Deserialize)]
pub struct LastSeenResponse {
    pub user_id: String,
    #[serde(default)]
    pub user_type: Option<String>,
    pub last_message_id: String,
}
