//! Reconnection policy.
//!
//! Pure functions deciding whether and when the transport retries, so they can be
//! tested without a network.

use std::time::Duration;

use super::error::TransportError;

pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            initial_delay: INITIAL_RECONNECT_DELAY,
            max_delay: MAX_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given retry (1-indexed), doubling up to `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

/// Check if the transport should give up immediately based on the error type.
///
/// # Returns
///
/// `true` if the error cannot be fixed by retrying (rejected credentials or a
/// malformed request), `false` otherwise
pub fn should_exit_immediately(error: &TransportError) -> bool {
    matches!(
        error,
        TransportError::Unauthorized(_) | TransportError::InvalidRequest(_)
    )
}

/// Check if the transport should attempt to reconnect.
///
/// # Arguments
///
/// * `error` - The transport error that occurred
/// * `current_attempt` - The number of retries already made (0-indexed)
/// * `max_attempts` - The maximum number of reconnection attempts allowed
///
/// # Returns
///
/// `true` if reconnection should be attempted, `false` otherwise
pub fn should_attempt_reconnect(
    error: &TransportError,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    // Don't reconnect if the error requires immediate exit
    if should_exit_immediately(error) {
        return false;
    }

    // Don't reconnect if we've exhausted all attempts
    current_attempt < max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_exit_immediately_with_unauthorized() {
        // テスト項目: Unauthorized エラーの場合、即座に終了すべきと判定される
        // given (前提条件):
        let error = TransportError::Unauthorized("HTTP 401".to_string());

        // when (操作):
        let result = should_exit_immediately(&error);

        // then (期待する結果):
        assert!(result);
    }

    #[test]
    fn test_should_exit_immediately_with_connection_error() {
        // テスト項目: ConnectionError の場合、即座に終了すべきではないと判定される
        // given (前提条件):
        let error = TransportError::ConnectionError("network error".to_string());

        // when (操作):
        let result = should_exit_immediately(&error);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_should_attempt_reconnect_with_unauthorized() {
        // テスト項目: Unauthorized エラーの場合、再接続すべきではないと判定される
        // given (前提条件):
        let error = TransportError::Unauthorized("HTTP 403".to_string());

        // when (操作):
        let result = should_attempt_reconnect(&error, 0, 5);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_should_attempt_reconnect_within_limit() {
        // テスト項目: 再接続回数が上限未満の場合、再接続すべきと判定される
        // given (前提条件):
        let error = TransportError::ConnectionError("network error".to_string());

        // when (操作):
        let result = should_attempt_reconnect(&error, 4, 5);

        // then (期待する結果):
        assert!(result);
    }

    #[test]
    fn test_should_attempt_reconnect_at_limit() {
        // テスト項目: 再接続回数が上限に達した場合、再接続すべきではないと判定される
        // given (前提条件):
        let error = TransportError::ConnectionError("network error".to_string());

        // when (操作):
        let result = should_attempt_reconnect(&error, 5, 5);

        // then (期待する結果):
        assert!(!result);
    }

    #[test]
    fn test_delay_escalates_toward_ceiling() {
        // テスト項目: 再接続間隔が 1 秒から倍々に増え、5 秒で頭打ちになる
        // given (前提条件):
        let policy = ReconnectPolicy::default();

        // when (操作):
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay_for(n).as_millis() as u64).collect();

        // then (期待する結果):
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000, 5000]);
    }
}
