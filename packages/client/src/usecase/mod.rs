//! Use case layer: the session core.
//!
//! - `room_session`: active room selection, history reconciliation, mark-read
//! - `typing`: local typing bursts and the remote typing flag
//! - `read_receipt`: outbound `seen` and the counterpart's seen marker
//! - `notification`: admin notification throttle
//! - `session`: facade wiring the above to an event source

mod context;
pub mod notification;
pub mod read_receipt;
pub mod room_session;
pub mod session;
pub mod typing;
pub mod update;

#[cfg(test)]
pub(crate) mod test_support;

pub use room_session::{RoomSessionController, RoomView};
pub use session::ChatSession;
pub use update::SessionUpdate;
