//! Error types for the domain layer.

use thiserror::Error;

/// Validation errors raised when constructing value objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// A required identifier was empty or whitespace
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// `user_type` was neither `admin` nor `customer`
    #[error("unknown user type '{0}'")]
    UnknownRole(String),

    /// A timestamp could not be parsed
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Transport-level errors of the realtime connection.
///
/// These never reach callers of `emit`; they drive the reconnection policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The handshake request could not be built (bad URL or token)
    #[error("Invalid handshake request: {0}")]
    InvalidRequest(String),

    /// The server rejected the credentials (HTTP 401/403)
    #[error("Handshake rejected: {0}")]
    Unauthorized(String),

    /// Network failure or link drop
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Errors returned by the REST collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },

    /// The response body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Errors decoding or encoding realtime frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("malformed '{event}' payload: {reason}")]
    Malformed { event: String, reason: String },

    #[error(transparent)]
    InvalidValue(#[from] ValueError),

    #[error("failed to encode frame: {0}")]
    Encode(String),
}
