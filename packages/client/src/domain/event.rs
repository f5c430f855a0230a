//! Typed realtime event model.
//!
//! Inbound frames are decoded into [`InboundEvent`] and routed by [`EventKind`].
//! Outbound frames are described by [`OutboundEvent`]; the transport stamps the
//! sender identity (`user_id`, `user_type`) when encoding.

use std::fmt;

use super::entity::Message;
use super::value_object::{MessageId, Role, RoomId, UserId};

/// Payload of `typing` / `stop_typing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSignal {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: Role,
}

/// Payload of `seen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenSignal {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: Role,
    pub last_message_id: MessageId,
}

/// Events received from the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    NewMessage(Message),
    Typing(PresenceSignal),
    StopTyping(PresenceSignal),
    Seen(SeenSignal),
    /// Admin only: a customer opened a new room
    NewRoom { room_id: Option<RoomId> },
    /// Admin only: some room's summary changed
    UpdateRoomList,
    Authenticated,
    AuthError { message: String },
    RoomJoined { room_id: RoomId },
    MessageError { error: String },
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::NewMessage(_) => EventKind::NewMessage,
            InboundEvent::Typing(_) => EventKind::Typing,
            InboundEvent::StopTyping(_) => EventKind::StopTyping,
            InboundEvent::Seen(_) => EventKind::Seen,
            InboundEvent::NewRoom { .. } => EventKind::NewRoom,
            InboundEvent::UpdateRoomList => EventKind::UpdateRoomList,
            InboundEvent::Authenticated => EventKind::Authenticated,
            InboundEvent::AuthError { .. } => EventKind::AuthError,
            InboundEvent::RoomJoined { .. } => EventKind::RoomJoined,
            InboundEvent::MessageError { .. } => EventKind::MessageError,
        }
    }
}

/// Dispatcher table key: one variant per inbound event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    Typing,
    StopTyping,
    Seen,
    NewRoom,
    UpdateRoomList,
    Authenticated,
    AuthError,
    RoomJoined,
    MessageError,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::NewMessage,
        EventKind::Typing,
        EventKind::StopTyping,
        EventKind::Seen,
        EventKind::NewRoom,
        EventKind::UpdateRoomList,
        EventKind::Authenticated,
        EventKind::AuthError,
        EventKind::RoomJoined,
        EventKind::MessageError,
    ];

    /// Event name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "new_message",
            EventKind::Typing => "typing",
            EventKind::StopTyping => "stop_typing",
            EventKind::Seen => "seen",
            EventKind::NewRoom => "new_room",
            EventKind::UpdateRoomList => "update_room_list",
            EventKind::Authenticated => "authenticated",
            EventKind::AuthError => "auth_error",
            EventKind::RoomJoined => "room_joined",
            EventKind::MessageError => "message_error",
        }
    }

    pub fn from_name(name: &str) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events produced by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    JoinRoom {
        room_id: RoomId,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    SendMessage {
        room_id: RoomId,
        content: String,
        reply_to: Option<MessageId>,
    },
    Typing {
        room_id: RoomId,
    },
    StopTyping {
        room_id: RoomId,
    },
    Seen {
        room_id: RoomId,
        last_message_id: MessageId,
    },
}

impl OutboundEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinRoom { .. } => "join_room",
            OutboundEvent::LeaveRoom { .. } => "leave_room",
            OutboundEvent::SendMessage { .. } => "send_message",
            OutboundEvent::Typing { .. } => "typing",
            OutboundEvent::StopTyping { .. } => "stop_typing",
            OutboundEvent::Seen { .. } => "seen",
        }
    }

    pub fn room_id(&self) -> &RoomId {
        match self {
            OutboundEvent::JoinRoom { room_id }
            | OutboundEvent::LeaveRoom { room_id }
            | OutboundEvent::SendMessage { room_id, .. }
            | OutboundEvent::Typing { room_id }
            | OutboundEvent::StopTyping { room_id }
            | OutboundEvent::Seen { room_id, .. } => room_id,
        }
    }
}
