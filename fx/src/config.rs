//! FX engine configuration.

use std::time::Duration;

use ratebridge_common::CurrencyCode;
use tracing::warn;

use crate::client::{OverflowPolicy, ResiliencePolicy};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Main FX engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FxConfig {
    /// Currency every provider rate is quoted against.
    pub pivot_currency: CurrencyCode,
    /// Timeout, bulkhead, retry and circuit breaker settings.
    pub resilience: ResiliencePolicy,
    pub logging: LoggingConfig,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            pivot_currency: CurrencyCode::eur(),
            resilience: ResiliencePolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and
    /// ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let policy = &mut config.resilience;

        if let Some(pivot) = parsed(&lookup, "FX_PIVOT_CURRENCY", |v| CurrencyCode::parse(v).ok()) {
            config.pivot_currency = pivot;
        }

        if let Some(ms) = parsed(&lookup, "FX_CALL_TIMEOUT_MS", |v| v.parse().ok()) {
            policy.timeout = Duration::from_millis(ms);
        }

        if let Some(limit) = parsed(&lookup, "FX_MAX_CONCURRENT_CALLS", |v| v.parse().ok()) {
            policy.max_concurrent_calls = limit;
        }

        if let Some(overflow) = parsed(&lookup, "FX_OVERFLOW_POLICY", |v| v.parse::<OverflowPolicy>().ok()) {
            policy.overflow = overflow;
        }

        if let Some(ms) = parsed(&lookup, "FX_RETRY_DELAY_MS", |v| v.parse().ok()) {
            policy.retry.delay = Duration::from_millis(ms);
        }

        if let Some(ms) = parsed(&lookup, "FX_RETRY_MAX_DURATION_MS", |v| v.parse().ok()) {
            policy.retry.max_duration = Duration::from_millis(ms);
        }

        if let Some(window) = parsed(&lookup, "FX_CIRCUIT_WINDOW", |v| v.parse().ok()) {
            policy.circuit_breaker.window_size = window;
        }

        if let Some(ms) = parsed(&lookup, "FX_CIRCUIT_OPEN_MS", |v| v.parse().ok()) {
            policy.circuit_breaker.open_duration = Duration::from_millis(ms);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(json) = parsed(&lookup, "LOG_JSON", |v| v.parse().ok()) {
            config.logging.json = json;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        let policy = &self.resilience;

        if policy.timeout.is_zero() {
            return Err("Call timeout cannot be 0".to_string());
        }

        if policy.max_concurrent_calls == 0 {
            return Err("Max concurrent calls cannot be 0".to_string());
        }

        if policy.circuit_breaker.window_size == 0 {
            return Err("Circuit window size cannot be 0".to_string());
        }

        let ratio = policy.circuit_breaker.failure_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err("Circuit failure ratio must be in (0, 1]".to_string());
        }

        if policy.circuit_breaker.open_duration.is_zero() {
            return Err("Circuit open duration cannot be 0".to_string());
        }

        if policy.retry.max_retries > 0 && policy.retry.delay >= policy.retry.max_duration {
            return Err("Retry delay must be shorter than the retry budget".to_string());
        }

        if self.logging.level.is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        Ok(())
    }
}

fn parsed<F, T>(lookup: &F, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    let value = parse(raw.trim());
    if value.is_none() {
        warn!(variable = name, value = %raw, "Ignoring unparsable configuration value");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = FxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pivot_currency, CurrencyCode::eur());
        assert_eq!(config.resilience.timeout, Duration::from_millis(5000));
        assert_eq!(config.resilience.max_concurrent_calls, 10);
        assert_eq!(config.resilience.circuit_breaker.window_size, 6);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = FxConfig::from_lookup(lookup(&[
            ("FX_PIVOT_CURRENCY", "USD"),
            ("FX_CALL_TIMEOUT_MS", "2500"),
            ("FX_MAX_CONCURRENT_CALLS", "4"),
            ("FX_OVERFLOW_POLICY", "reject"),
            ("FX_RETRY_DELAY_MS", "200"),
            ("FX_RETRY_MAX_DURATION_MS", "1000"),
            ("FX_CIRCUIT_WINDOW", "10"),
            ("FX_CIRCUIT_OPEN_MS", "30000"),
            ("LOG_LEVEL", "debug"),
            ("LOG_JSON", "false"),
        ]));

        assert_eq!(config.pivot_currency, CurrencyCode::usd());
        assert_eq!(config.resilience.timeout, Duration::from_millis(2500));
        assert_eq!(config.resilience.max_concurrent_calls, 4);
        assert_eq!(config.resilience.overflow, OverflowPolicy::Reject);
        assert_eq!(config.resilience.retry.delay, Duration::from_millis(200));
        assert_eq!(config.resilience.retry.max_duration, Duration::from_secs(1));
        assert_eq!(config.resilience.circuit_breaker.window_size, 10);
        assert_eq!(
            config.resilience.circuit_breaker.open_duration,
            Duration::from_secs(30)
        );
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = FxConfig::from_lookup(lookup(&[
            ("FX_PIVOT_CURRENCY", "euro"),
            ("FX_CALL_TIMEOUT_MS", "soon"),
            ("FX_OVERFLOW_POLICY", "drop"),
        ]));

        assert_eq!(config, FxConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = FxConfig::default();
        config.resilience.max_concurrent_calls = 0;
        assert!(config.validate().is_err());

        let mut config = FxConfig::default();
        config.resilience.circuit_breaker.failure_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = FxConfig::default();
        config.resilience.retry.delay = Duration::from_secs(3);
        assert!(config.validate().is_err());
    }
}
