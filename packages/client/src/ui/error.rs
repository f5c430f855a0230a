//! Error types for the terminal client.

use thiserror::Error;

use crate::domain::ValueError;

/// Fatal errors raised before the session starts
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("auth token is missing (pass --token or set LIVEDESK_TOKEN)")]
    MissingToken,

    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] ValueError),
}

/// A line starting with `/` that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown command '{0}' (try /help)")]
    Unknown(String),
}
