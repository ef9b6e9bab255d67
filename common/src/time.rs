//! Timing defaults for outbound provider calls.

use std::time::Duration;

/// Resilience policy defaults.
pub mod constants {
    use super::Duration;

    /// Upper bound for a single provider call, including bulkhead wait (5 seconds).
    pub fn call_timeout() -> Duration {
        Duration::from_millis(5000)
    }

    /// Delay before the single retry (1 second).
    pub fn retry_delay() -> Duration {
        Duration::from_millis(1000)
    }

    /// A retry is only scheduled while the first attempt started less than this long ago (3 seconds).
    pub fn retry_max_duration() -> Duration {
        Duration::from_millis(3000)
    }

    /// How long an open circuit rejects calls before allowing a trial (5 seconds).
    pub fn circuit_open_duration() -> Duration {
        Duration::from_millis(5000)
    }

    /// Maximum retries per call.
    pub const MAX_RETRIES: u32 = 1;

    /// Maximum concurrent in-flight calls per operation.
    pub const MAX_CONCURRENT_CALLS: usize = 10;

    /// Number of most recent outcomes the circuit breaker looks at.
    pub const CIRCUIT_WINDOW_SIZE: usize = 6;

    /// Failure ratio within a full window at which the circuit opens.
    pub const CIRCUIT_FAILURE_RATIO: f64 = 0.5;
}

/// Whole milliseconds of a duration, saturating, for log fields.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
