//! Fixed-delay retry policy bounded by a total time budget.

use std::time::Duration;

use ratebridge_common::constants;

/// Configuration for retrying failed provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The maximum number of retries to attempt.
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Delay between a failure and the next attempt.
    pub delay: Duration,
    /// No retry is scheduled once this much time has passed since the
    /// first attempt started.
    pub max_duration: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: constants::MAX_RETRIES,
            delay: constants::retry_delay(),
            max_duration: constants::retry_max_duration(),
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy with a fixed delay and the default budget.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            delay,
            ..Self::default()
        }
    }

    /// Disable retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Check if another attempt may be scheduled.
    ///
    /// * `retries_done` - retries already performed for this call
    /// * `elapsed` - time since the first attempt started
    pub fn should_retry(&self, retries_done: u32, elapsed: Duration) -> bool {
        retries_done < self.max_retries && elapsed < self.max_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.delay, Duration::from_millis(1000));
        assert_eq!(policy.max_duration, Duration::from_millis(3000));
    }

    #[test]
    fn test_retries_once_within_budget() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(0, Duration::ZERO));
        assert!(policy.should_retry(0, Duration::from_millis(2999)));
        assert!(!policy.should_retry(1, Duration::ZERO));
    }

    #[test]
    fn test_budget_exhausted() {
        let policy = RetryPolicy::default();

        assert!(!policy.should_retry(0, Duration::from_millis(3000)));
        assert!(!policy.should_retry(0, Duration::from_secs(5)));
    }

    #[test]
    fn test_retry_policy_fixed() {
        let policy = RetryPolicy::fixed(Duration::from_millis(500), 2);

        assert_eq!(policy.delay, Duration::from_millis(500));
        assert!(policy.should_retry(1, Duration::from_millis(1000)));
        assert!(!policy.should_retry(2, Duration::from_millis(1000)));
    }

    #[test]
    fn test_retry_policy_no_retry() {
        let policy = RetryPolicy::no_retry();

        assert_eq!(policy.max_retries, 0);
        assert!(!policy.should_retry(0, Duration::ZERO));
    }
}
