//! Interfaces the session core needs from the outside world.
//!
//! The realtime connection and the REST backend are implemented in the
//! infrastructure layer; use cases depend only on these traits.

use async_trait::async_trait;

use super::{
    ApiError, EventKind, InboundEvent, Message, OutboundEvent, RoomId, SeenMarker, Subscription,
    UserId,
};

/// Outbound half of the realtime channel.
pub trait EventEmitter: Send + Sync {
    /// Send an event. Returns `false` when the event was dropped because there is
    /// no live connection; dropped events are never queued.
    fn emit(&self, event: OutboundEvent) -> bool;
}

/// Inbound half of the realtime channel.
pub trait EventSource: Send + Sync {
    /// Register a handler on the current connection's dispatcher
    fn subscribe(
        &self,
        kind: EventKind,
        handler: Box<dyn Fn(&InboundEvent) + Send + Sync>,
    ) -> Subscription;
}

/// REST collaborator.
///
/// Every call is a suspension point: the active room may change before it
/// resolves, so callers must re-check the selection before applying results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Idempotently make sure a room exists for `customer_id`
    async fn ensure_room(&self, customer_id: &UserId, customer_name: &str)
    -> Result<(), ApiError>;

    /// Fetch the ordered message history of a room
    async fn fetch_history(&self, room_id: &RoomId) -> Result<Vec<Message>, ApiError>;

    /// Acknowledge every message up to now as read
    async fn mark_read(&self, room_id: &RoomId) -> Result<(), ApiError>;

    /// Fetch the counterpart's last seen marker, if the backend has one
    async fn fetch_last_seen(&self, room_id: &RoomId) -> Result<Option<SeenMarker>, ApiError>;
}
