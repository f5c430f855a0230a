//! Client configuration.

use std::time::Duration;

use crate::domain::ReconnectPolicy;

pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Idle time after the last keystroke before `stop_typing` is sent
pub const TYPING_IDLE: Duration = Duration::from_millis(1500);

/// Minimum gap between two admin notifications
pub const NOTIFICATION_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws_url: String,
    pub api_url: String,
    pub reconnect: ReconnectPolicy,
    pub session: SessionOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            session: SessionOptions::default(),
        }
    }
}

/// Timing knobs of a chat session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub typing_idle: Duration,
    pub notification_window: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            typing_idle: TYPING_IDLE,
            notification_window: NOTIFICATION_WINDOW,
        }
    }
}
