//! Domain layer: value objects, entities, the event model and the ports the
//! use cases depend on.

pub mod connection;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod event;
pub mod port;
pub mod reconnect;
pub mod selection;
pub mod value_object;

pub use connection::ConnectionState;
pub use dispatcher::{EventDispatcher, Handler, Subscription};
pub use entity::{Message, MessageLog, ReplyPreview, SeenMarker, SeenSource, Sender};
pub use error::{ApiError, ProtocolError, TransportError, ValueError};
pub use event::{EventKind, InboundEvent, OutboundEvent, PresenceSignal, SeenSignal};
pub use port::{ChatApi, EventEmitter, EventSource};
pub use reconnect::ReconnectPolicy;
pub use selection::{RoomPhase, RoomSelection, SelectionChange};
pub use value_object::{Identity, MessageId, Role, RoomId, Timestamp, UserId};

#[cfg(test)]
pub use port::MockChatApi;
