//! Update formatting for terminal display.

use livedesk_shared::time::{timestamp_to_hh_mm, timestamp_to_rfc3339};

use crate::{
    domain::{ConnectionState, Identity, Message, SeenMarker},
    usecase::SessionUpdate,
};

const RULE: &str = "------------------------------------------------------------";

/// Formatter for session updates
pub struct UpdateFormatter;

impl UpdateFormatter {
    /// Render `update` for the user `me`.
    ///
    /// # Returns
    ///
    /// `None` for updates that have nothing to show
    pub fn format_update(update: &SessionUpdate, me: &Identity) -> Option<String> {
        let text = match update {
            SessionUpdate::RoomSelected { room_id, left } => match left {
                Some(left) => format!("\n* left '{}', joined '{}'\n", left, room_id),
                None => format!("\n* joined '{}'\n", room_id),
            },
            SessionUpdate::RoomLeft { room_id } => format!("\n* left '{}'\n", room_id),
            SessionUpdate::HistoryLoaded { room_id, added } => {
                format!("\n* {} earlier message(s) in '{}'\n", added, room_id)
            }
            SessionUpdate::HistoryFailed { room_id, reason } => {
                format!("\n! could not load history for '{}': {}\n", room_id, reason)
            }
            SessionUpdate::MessageAppended(message) => Self::format_message(message, me),
            SessionUpdate::TypingChanged { typing, .. } => {
                if *typing {
                    format!("\n~ {} is typing...\n", me.role.counterpart())
                } else {
                    return None;
                }
            }
            SessionUpdate::SeenUpdated(marker) => Self::format_seen(marker),
            SessionUpdate::RoomListStale => return None,
            SessionUpdate::Notification(message) => format!(
                "\n(!) new message from {} in '{}'\n",
                message.sender.user_id, message.room_id
            ),
            SessionUpdate::Connection(state) => Self::format_connection(*state)?,
            SessionUpdate::ServerError(error) => format!("\n! server: {}\n", error),
        };
        Some(text)
    }

    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `message` - The message to render
    /// * `me` - The local identity, used to mark own messages
    pub fn format_message(message: &Message, me: &Identity) -> String {
        let me_suffix = if message.sender.user_id == me.id {
            " (me)"
        } else {
            ""
        };
        let mut output = format!("\n\n{}\n", RULE);
        if let Some(preview) = &message.reply_preview {
            let who = preview.role.map(|role| role.as_str()).unwrap_or("unknown");
            output.push_str(&format!("  > {}: {}\n", who, preview.content));
        }
        output.push_str(&format!(
            "[{}] @{}{} ({}): {}\n",
            timestamp_to_hh_mm(message.created_at.value()),
            message.sender.user_id,
            me_suffix,
            message.sender.role,
            message.content
        ));
        output.push_str(&format!(
            "id {} sent at {}\n{}\n",
            message.id,
            timestamp_to_rfc3339(message.created_at.value()),
            RULE
        ));
        output
    }

    pub fn format_seen(marker: &SeenMarker) -> String {
        format!(
            "\n  seen by {} up to {}\n",
            marker.observer, marker.last_message_id
        )
    }

    fn format_connection(state: ConnectionState) -> Option<String> {
        match state {
            ConnectionState::Connected => Some("\n* connected\n".to_string()),
            ConnectionState::Reconnecting => {
                Some("\n* connection lost, reconnecting...\n".to_string())
            }
            ConnectionState::Disconnected => Some("\n* disconnected\n".to_string()),
            ConnectionState::Connecting => None,
        }
    }
}
