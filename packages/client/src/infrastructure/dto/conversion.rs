//! Conversion logic between DTOs and domain types.

use chrono::{DateTime, NaiveDateTime};
use serde::{Serialize, de::DeserializeOwned};

use crate::domain::{
    EventKind, Identity, InboundEvent, Message, MessageId, OutboundEvent, PresenceSignal,
    ProtocolError, ReplyPreview, Role, RoomId, SeenMarker, SeenSignal, SeenSource, Sender,
    Timestamp, UserId, ValueError,
};

use super::{http::LastSeenResponse, websocket as dto};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a backend timestamp.
///
/// Accepts RFC 3339, or ISO-8601 without offset which is interpreted as UTC.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, ValueError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Timestamp::new(dt.timestamp_millis()));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Timestamp::new(naive.and_utc().timestamp_millis()))
        .ok_or_else(|| ValueError::InvalidTimestamp(raw.to_string()))
}

// ========================================
// DTO → Domain
// ========================================

impl TryFrom<dto::MessageDto> for Message {
    type Error = ValueError;

    fn try_from(dto: dto::MessageDto) -> Result<Self, Self::Error> {
        let reply_to = match dto.reply_to {
            Some(id) if !id.trim().is_empty() => Some(MessageId::new(id)?),
            _ => None,
        };
        let reply_preview = dto.reply_to_message.and_then(|preview| {
            let content = preview.content?;
            Some(ReplyPreview {
                role: preview.user_type.and_then(|raw| raw.parse().ok()),
                content,
            })
        });

        Ok(Self {
            id: MessageId::new(dto.id)?,
            room_id: RoomId::new(dto.room_id)?,
            sender: Sender {
                user_id: UserId::new(dto.user_id)?,
                role: dto.user_type.parse()?,
            },
            content: dto.content,
            created_at: parse_timestamp(&dto.created_at)?,
            reply_to,
            reply_preview,
        })
    }
}

impl TryFrom<dto::PresenceDto> for PresenceSignal {
    type Error = ValueError;

    fn try_from(dto: dto::PresenceDto) -> Result<Self, Self::Error> {
        Ok(Self {
            room_id: RoomId::new(dto.room_id)?,
            user_id: UserId::new(dto.user_id)?,
            role: dto.user_type.parse()?,
        })
    }
}

impl TryFrom<dto::SeenDto> for SeenSignal {
    type Error = ValueError;

    fn try_from(dto: dto::SeenDto) -> Result<Self, Self::Error> {
        let role = dto.user_type.ok_or(ValueError::Empty("user_type"))?;
        Ok(Self {
            room_id: RoomId::new(dto.room_id)?,
            user_id: UserId::new(dto.user_id)?,
            role: role.parse()?,
            last_message_id: MessageId::new(dto.last_message_id)?,
        })
    }
}

/// Build a snapshot seen marker for `room_id`.
///
/// The endpoint may omit `user_type`; the observer is then assumed to be
/// `default_role` (the requesting identity's counterpart).
pub fn seen_marker_from_snapshot(
    response: LastSeenResponse,
    room_id: &RoomId,
    default_role: Role,
) -> Result<SeenMarker, ValueError> {
    let observer_role = match response.user_type {
        Some(raw) => raw.parse()?,
        None => default_role,
    };
    Ok(SeenMarker {
        room_id: room_id.clone(),
        observer: UserId::new(response.user_id)?,
        observer_role,
        last_message_id: MessageId::new(response.last_message_id)?,
        source: SeenSource::Snapshot,
    })
}

fn payload<T: DeserializeOwned>(kind: EventKind, data: serde_json::Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::Malformed {
        event: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}

/// Decode one text frame into an inbound event
pub fn decode_frame(text: &str) -> Result<InboundEvent, ProtocolError> {
    let frame: dto::IncomingFrame =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed {
            event: "<envelope>".to_string(),
            reason: e.to_string(),
        })?;
    let kind = EventKind::from_name(&frame.event)
        .ok_or_else(|| ProtocolError::UnknownEvent(frame.event.clone()))?;
    let data = frame.data;

    let event = match kind {
        EventKind::NewMessage => {
            InboundEvent::NewMessage(payload::<dto::MessageDto>(kind, data)?.try_into()?)
        }
        EventKind::Typing => {
            InboundEvent::Typing(payload::<dto::PresenceDto>(kind, data)?.try_into()?)
        }
        EventKind::StopTyping => {
            InboundEvent::StopTyping(payload::<dto::PresenceDto>(kind, data)?.try_into()?)
        }
        EventKind::Seen => InboundEvent::Seen(payload::<dto::SeenDto>(kind, data)?.try_into()?),
        EventKind::NewRoom => {
            let notice = if data.is_null() {
                dto::NewRoomDto::default()
            } else {
                payload::<dto::NewRoomDto>(kind, data)?
            };
            InboundEvent::NewRoom {
                room_id: notice.room_id.and_then(|id| RoomId::new(id).ok()),
            }
        }
        EventKind::UpdateRoomList => InboundEvent::UpdateRoomList,
        EventKind::Authenticated => InboundEvent::Authenticated,
        EventKind::AuthError => {
            let dto: dto::AuthErrorDto = payload(kind, data)?;
            InboundEvent::AuthError {
                message: dto.message,
            }
        }
        EventKind::RoomJoined => {
            let dto: dto::RoomJoinedDto = payload(kind, data)?;
            InboundEvent::RoomJoined {
                room_id: RoomId::new(dto.room_id)?,
            }
        }
        EventKind::MessageError => {
            let dto: dto::MessageErrorDto = payload(kind, data)?;
            InboundEvent::MessageError { error: dto.error }
        }
    };
    Ok(event)
}

// ========================================
// Domain → DTO
// ========================================

fn frame<T: Serialize>(event: &'static str, data: T) -> Result<String, ProtocolError> {
    serde_json::to_string(&dto::OutgoingFrame { event, data })
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn presence(room_id: &RoomId, identity: &Identity) -> dto::PresenceDto {
    dto::PresenceDto {
        room_id: room_id.as_str().to_string(),
        user_id: identity.id.as_str().to_string(),
        user_type: identity.role.as_str().to_string(),
    }
}

/// Encode an outbound event, stamping it with `identity`
pub fn encode_frame(event: &OutboundEvent, identity: &Identity) -> Result<String, ProtocolError> {
    let name = event.name();
    match event {
        OutboundEvent::JoinRoom { room_id }
        | OutboundEvent::Typing { room_id }
        | OutboundEvent::StopTyping { room_id } => frame(name, presence(room_id, identity)),
        OutboundEvent::LeaveRoom { room_id } => frame(
            name,
            dto::LeaveRoomDto {
                room_id: room_id.as_str().to_string(),
            },
        ),
        OutboundEvent::SendMessage {
            room_id,
            content,
            reply_to,
        } => frame(
            name,
            dto::SendMessageDto {
                room_id: room_id.as_str().to_string(),
                user_id: identity.id.as_str().to_string(),
                user_type: identity.role.as_str().to_string(),
                content: content.clone(),
                reply_to: reply_to.as_ref().map(|id| id.as_str().to_string()),
            },
        ),
        OutboundEvent::Seen {
            room_id,
            last_message_id,
        } => frame(
            name,
            dto::SeenDto {
                room_id: room_id.as_str().to_string(),
                user_id: identity.id.as_str().to_string(),
                user_type: Some(identity.role.as_str().to_string()),
                last_message_id: last_message_id.as_str().to_string(),
            },
        ),
    }
}
