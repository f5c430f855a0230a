//! Admin notification throttle.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use livedesk_shared::time::Clock;

/// Lets at most one notification through per window.
pub struct NotificationThrottle {
    clock: Arc<dyn Clock>,
    window_millis: i64,
    last: Mutex<Option<i64>>,
}

impl NotificationThrottle {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            clock,
            window_millis: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            last: Mutex::new(None),
        }
    }

    /// Whether a notification may fire now; records it if so
    pub fn allow(&self) -> bool {
        let now = self.clock.now_millis();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now - previous <= self.window_millis => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
