//! Bounded retry policy for tool-server calls.
//!
//! A [`RetryPolicy`] names how many attempts a call gets, how long to wait
//! between them, and whether a closed channel triggers a reconnect before
//! the next attempt.

mod backoff;

pub use backoff::ExponentialBackoff;

use std::time::Duration;

/// Default number of attempts for a tool call.
pub const DEFAULT_TOOL_ATTEMPTS: u32 = 2;
/// Default pause between tool-call attempts.
pub const DEFAULT_TOOL_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below one behave as one.
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
    pub reconnect_on_closed: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_TOOL_ATTEMPTS, DEFAULT_TOOL_RETRY_DELAY)
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: ExponentialBackoff::fixed(delay),
            reconnect_on_closed: true,
        }
    }

    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn reconnect_on_closed(mut self, enabled: bool) -> Self {
        self.reconnect_on_closed = enabled;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay_for(attempt)
    }

    pub fn is_last(&self, attempt: u32) -> bool {
        attempt >= self.attempts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 2);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert!(policy.reconnect_on_closed);
        assert!(!policy.is_last(1));
        assert!(policy.is_last(2));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy::fixed(0, Duration::from_millis(10));
        assert_eq!(policy.attempts(), 1);
        assert!(policy.is_last(1));
    }
}
