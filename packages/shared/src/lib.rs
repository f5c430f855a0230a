//! Utilities shared across the Livedesk workspace.

pub mod logger;
pub mod time;
