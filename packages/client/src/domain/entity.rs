//! Entities held by the session core.

use std::collections::HashSet;

use super::value_object::{MessageId, Role, RoomId, Timestamp, UserId};

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub role: Role,
}

/// Summary of the message a reply points at, as embedded by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPreview {
    pub role: Option<Role>,
    pub content: String,
}

/// A chat message, either fetched as history or pushed live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: Sender,
    pub content: String,
    pub created_at: Timestamp,
    pub reply_to: Option<MessageId>,
    pub reply_preview: Option<ReplyPreview>,
}

/// Where a seen marker was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenSource {
    /// A `seen` event on the realtime channel
    Live,
    /// The REST last-seen snapshot fetched on room selection
    Snapshot,
}

/// The latest message a counterpart is known to have read in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenMarker {
    pub room_id: RoomId,
    pub observer: UserId,
    pub observer_role: Role,
    pub last_message_id: MessageId,
    pub source: SeenSource,
}

/// Merged view of history and live messages for the active room.
///
/// Messages are unique by id and ordered by `created_at`; messages with equal
/// timestamps keep arrival order.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message, returning `false` when its id is already present
    pub fn insert(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        let position = self
            .messages
            .partition_point(|existing| existing.created_at <= message.created_at);
        self.ids.insert(message.id.clone());
        self.messages.insert(position, message);
        true
    }

    /// Merge a history snapshot into the log, returning how many messages were new
    pub fn merge_history(&mut self, history: Vec<Message>) -> usize {
        let mut added = 0;
        for message in history {
            if self.insert(message) {
                added += 1;
            }
        }
        added
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}
