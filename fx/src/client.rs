//! Resilient wrapper around outbound provider calls.
//!
//! Every call passes, in order: circuit breaker admission, the attempt
//! timeout (which also bounds the wait for a bulkhead slot), the bulkhead,
//! and finally the provider round-trip. Retryable failures are attempted
//! once more after a fixed delay while the retry budget allows.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use ratebridge_common::{constants, millis};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::CallFailure;
use crate::retry::RetryPolicy;

/// Outbound provider operation. Each one owns its own breaker and bulkhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Latest pivot-relative rates.
    LatestRates,
    /// Existence check for a set of currencies.
    CurrencyExistence,
    /// Full list of supported currencies.
    AllCurrencies,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::LatestRates,
        Operation::CurrencyExistence,
        Operation::AllCurrencies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::LatestRates => "latest",
            Operation::CurrencyExistence => "currencies",
            Operation::AllCurrencies => "all-currencies",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a call that finds every bulkhead slot taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for a slot, bounded by the call timeout.
    #[default]
    Queue,
    /// Fail immediately with [`CallFailure::Overloaded`].
    Reject,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(OverflowPolicy::Queue),
            "reject" => Ok(OverflowPolicy::Reject),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

/// Timeout, bulkhead, retry and breaker settings shared by all operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ResiliencePolicy {
    /// Upper bound for one attempt, including the bulkhead wait.
    pub timeout: Duration,
    /// Concurrent in-flight calls allowed per operation.
    pub max_concurrent_calls: usize,
    pub overflow: OverflowPolicy,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            timeout: constants::call_timeout(),
            max_concurrent_calls: constants::MAX_CONCURRENT_CALLS,
            overflow: OverflowPolicy::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

struct OperationGuard {
    breaker: CircuitBreaker,
    bulkhead: Semaphore,
}

impl OperationGuard {
    fn new(operation: Operation, policy: &ResiliencePolicy) -> Self {
        Self {
            breaker: CircuitBreaker::new(operation.as_str(), policy.circuit_breaker),
            bulkhead: Semaphore::new(policy.max_concurrent_calls),
        }
    }
}

/// Applies the [`ResiliencePolicy`] to provider calls.
pub struct ResilientClient {
    policy: ResiliencePolicy,
    latest: OperationGuard,
    currencies: OperationGuard,
    all_currencies: OperationGuard,
}

impl ResilientClient {
    pub fn new(policy: ResiliencePolicy) -> Self {
        Self {
            latest: OperationGuard::new(Operation::LatestRates, &policy),
            currencies: OperationGuard::new(Operation::CurrencyExistence, &policy),
            all_currencies: OperationGuard::new(Operation::AllCurrencies, &policy),
            policy,
        }
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// Current breaker state for an operation.
    pub fn circuit_state(&self, operation: Operation) -> CircuitState {
        self.guard(operation).breaker.state()
    }

    /// Run `attempt` under the resilience policy.
    ///
    /// `attempt` is invoked once per try and should perform one full
    /// provider round-trip, including any reconciliation of the response.
    pub async fn call<T, F, Fut>(&self, operation: Operation, mut attempt: F) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let guard = self.guard(operation);
        let started = Instant::now();
        let mut retries = 0;

        loop {
            debug!(operation = %operation, attempt = retries + 1, "Calling provider");

            let failure = match self.attempt_once(operation, guard, &mut attempt).await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if !failure.is_retryable() || !self.policy.retry.should_retry(retries, started.elapsed()) {
                return Err(failure);
            }

            retries += 1;
            warn!(
                operation = %operation,
                error = %failure,
                delay_ms = millis(self.policy.retry.delay),
                "Provider call failed, retrying"
            );
            tokio::time::sleep(self.policy.retry.delay).await;
        }
    }

    async fn attempt_once<T, F, Fut>(
        &self,
        operation: Operation,
        guard: &OperationGuard,
        attempt: &mut F,
    ) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let permit = guard
            .breaker
            .try_acquire()
            .ok_or(CallFailure::CircuitOpen { operation })?;

        let limit = self.policy.max_concurrent_calls;
        let bounded = tokio::time::timeout(self.policy.timeout, async {
            let _slot = match self.policy.overflow {
                OverflowPolicy::Queue => guard.bulkhead.acquire().await.ok(),
                OverflowPolicy::Reject => guard.bulkhead.try_acquire().ok(),
            }
            .ok_or(CallFailure::Overloaded { operation, limit })?;

            attempt().await
        })
        .await;

        let outcome = bounded.unwrap_or(Err(CallFailure::Timeout {
            operation,
            after: self.policy.timeout,
        }));

        match &outcome {
            Ok(_) => permit.success(),
            Err(failure) if failure.counts_against_circuit() => permit.failure(),
            Err(_) => permit.ignore(),
        }

        outcome
    }

    fn guard(&self, operation: Operation) -> &OperationGuard {
        match operation {
            Operation::LatestRates => &self.latest,
            Operation::CurrencyExistence => &self.currencies,
            Operation::AllCurrencies => &self.all_currencies,
        }
    }
}
