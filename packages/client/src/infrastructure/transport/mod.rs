//! Realtime transport.
//!
//! - `websocket`: a `tokio-tungstenite` connection manager implementing
//!   [`EventEmitter`](crate::domain::EventEmitter) and
//!   [`EventSource`](crate::domain::EventSource)

pub mod websocket;

pub use websocket::ConnectionManager;
