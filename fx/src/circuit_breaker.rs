//! Rolling-window circuit breaker guarding one outbound operation.
//!
//! ```text
//! Closed   -> Open:     window full and failure ratio >= threshold
//! Open     -> HalfOpen: open duration elapsed, next call is the trial
//! HalfOpen -> Closed:   trial succeeds (window cleared)
//! HalfOpen -> Open:     trial fails (full open duration again)
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use ratebridge_common::{constants, millis};
use tokio::time::Instant;
use tracing::{info, warn};

/// Runtime circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of most recent outcomes considered.
    pub window_size: usize,
    /// Failure share of a full window at which the circuit opens.
    pub failure_ratio: f64,
    /// How long the circuit stays open before a trial call.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: constants::CIRCUIT_WINDOW_SIZE,
            failure_ratio: constants::CIRCUIT_FAILURE_RATIO,
            open_duration: constants::circuit_open_duration(),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    // true = failure, newest at the back
    outcomes: VecDeque<bool>,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            outcomes: VecDeque::new(),
            open_until: None,
            trial_in_flight: false,
        }
    }

    fn failures(&self) -> usize {
        self.outcomes.iter().filter(|failed| **failed).count()
    }

    fn open(&mut self, open_duration: Duration) {
        self.state = CircuitState::Open;
        self.open_until = Some(Instant::now() + open_duration);
        self.outcomes.clear();
        self.trial_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.open_until = None;
        self.outcomes.clear();
        self.trial_in_flight = false;
    }
}

/// Thread-safe circuit breaker for one provider operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(CircuitInner::new()),
        }
    }

    /// Ask to let one call through.
    ///
    /// Returns `None` while open, and while a half-open trial is already in
    /// flight. The returned permit must be settled with the call's outcome;
    /// dropping it unsettled (e.g. on cancellation) frees a trial slot
    /// without touching the window.
    pub fn try_acquire(&self) -> Option<CircuitPermit<'_>> {
        let mut inner = self.inner.lock();
        let state = inner.state;
        let trial = match state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                true
            }
            CircuitState::Open => {
                let can_probe = inner
                    .open_until
                    .map(|open_until| Instant::now() >= open_until)
                    .unwrap_or(false);
                if !can_probe {
                    return None;
                }
                inner.state = CircuitState::HalfOpen;
                inner.open_until = None;
                inner.trial_in_flight = true;
                info!(operation = self.name, "Circuit half-open, allowing trial call");
                true
            }
        };

        Some(CircuitPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::HalfOpen if trial => {
                inner.close();
                info!(operation = self.name, "Circuit closed after successful trial");
            }
            CircuitState::Closed => self.push_outcome(&mut inner, false),
            // late result of a call admitted before the state changed
            _ => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::HalfOpen if trial => {
                inner.open(self.config.open_duration);
                warn!(
                    operation = self.name,
                    open_ms = millis(self.config.open_duration),
                    "Trial call failed, circuit re-opened"
                );
            }
            CircuitState::Closed => self.push_outcome(&mut inner, true),
            _ => {}
        }
    }

    fn release_trial(&self, trial: bool) {
        if trial {
            self.inner.lock().trial_in_flight = false;
        }
    }

    fn push_outcome(&self, inner: &mut CircuitInner, failed: bool) {
        inner.outcomes.push_back(failed);
        while inner.outcomes.len() > self.config.window_size {
            inner.outcomes.pop_front();
        }

        if inner.outcomes.len() < self.config.window_size {
            return;
        }

        let failures = inner.failures();
        let ratio = failures as f64 / inner.outcomes.len() as f64;
        if ratio >= self.config.failure_ratio {
            inner.open(self.config.open_duration);
            warn!(
                operation = self.name,
                failures,
                window = self.config.window_size,
                open_ms = millis(self.config.open_duration),
                "Failure threshold reached, circuit opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Failures within the current window.
    pub fn failure_count(&self) -> usize {
        self.inner.lock().failures()
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
#[derive(Debug)]
#[must_use = "settle the permit with the call outcome"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    /// Whether this permit is the single half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }

    /// Outcome excluded from accounting.
    pub fn ignore(mut self) {
        self.settled = true;
        self.breaker.release_trial(self.trial);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release_trial(self.trial);
        }
    }
}
