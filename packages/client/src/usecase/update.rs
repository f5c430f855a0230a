//! Updates published by a chat session to its presentation layer.

use crate::domain::{ConnectionState, Message, RoomId, SeenMarker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// A room became the active room
    RoomSelected {
        room_id: RoomId,
        left: Option<RoomId>,
    },
    /// The active room was vacated without selecting another
    RoomLeft { room_id: RoomId },
    /// History was merged into the active room; `added` excludes duplicates
    HistoryLoaded { room_id: RoomId, added: usize },
    HistoryFailed { room_id: RoomId, reason: String },
    /// A live message was appended to the active room
    MessageAppended(Message),
    /// The counterpart started or stopped typing in the active room
    TypingChanged { room_id: RoomId, typing: bool },
    SeenUpdated(SeenMarker),
    /// The admin room list should be refetched
    RoomListStale,
    /// A customer message worth alerting the admin about
    Notification(Message),
    Connection(ConnectionState),
    /// `auth_error` or `message_error` from the server
    ServerError(String),
}
