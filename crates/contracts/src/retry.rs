//! RetryPolicy - inline exponential backoff
//!
//! Shared by the delivery path and the formatter client. Only the policy lives
//! here; the async loops belong to the crates that own the calls.

use std::time::Duration;

use crate::DispatchConfig;

/// Bounded exponential backoff for calls retried in place
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Calls per operation, first call included
    pub max_inline_attempts: u32,
    /// Delay unit
    pub base_delay: Duration,
    /// Cap applied to every delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_inline_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy from the `[dispatch]` section
    pub fn from_dispatch(config: &DispatchConfig) -> Self {
        Self {
            max_inline_attempts: config.inline_retries,
            base_delay: config.backoff_base(),
            max_delay: config.backoff_max(),
            ..Self::default()
        }
    }

    /// Retries without waiting (tests, one-shot CLI calls)
    pub fn without_delay(max_inline_attempts: u32) -> Self {
        Self {
            max_inline_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before call `attempt` (0-indexed); the first call never waits
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(attempt as i32);
        if !delay_nanos.is_finite() || delay_nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(delay_nanos.round() as u64)
    }

    /// Whether another call is allowed after `calls_made` failures
    #[must_use]
    pub const fn should_retry(&self, calls_made: u32) -> bool {
        calls_made < self.max_inline_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_max_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_secs(10));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_from_dispatch() {
        let config = DispatchConfig {
            inline_retries: 5,
            backoff_base_ms: 100,
            backoff_max_ms: 300,
            ..DispatchConfig::default()
        };
        let policy = RetryPolicy::from_dispatch(&config);
        assert_eq!(policy.max_inline_attempts, 5);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
    }

    #[test]
    fn test_without_delay() {
        let policy = RetryPolicy::without_delay(2);
        assert_eq!(policy.delay_for_attempt(5), Duration::ZERO);
        assert!(!policy.should_retry(2));
    }
}
