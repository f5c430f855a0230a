//! Data Transfer Objects (DTOs) for the backend protocols.
//!
//! DTOs are organized by protocol:
//! - `websocket`: realtime frame DTOs
//! - `http`: REST request/response DTOs

pub mod conversion;
pub mod http;
pub mod websocket;
