//! Infrastructure layer: wire DTOs, the WebSocket transport and the REST client.

pub mod api;
pub mod dto;
pub mod transport;
