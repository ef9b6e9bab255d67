//! RateBridge FX Engine
//!
//! Currency conversion through a pivot currency, backed by a single
//! unreliable quote provider.
//!
//! # Features
//!
//! - Per-operation circuit breaker, bulkhead, timeout and retry
//! - Caching of rates and currency lists until explicitly invalidated
//! - Reconciliation of provider answers (presence, base, sign, date)
//! - Half-up decimal conversion rounded to two places
//! - Closed error taxonomy for the request-handling layer
//!
//! # Example
//!
//! ```rust,ignore
//! use ratebridge_fx::{FxConfig, FxEngine};
//!
//! let engine = FxEngine::new(provider, FxConfig::from_env());
//!
//! let outcome = engine.convert("GBP", "USD", "100").await?;
//! assert_eq!(outcome.converted_amount.to_string(), "126.43");
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod provider;
pub mod rates;
pub mod retry;
pub mod telemetry;

pub use cache::{CacheSpace, CacheStats, RateCache, SharedRateCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{Operation, OverflowPolicy, ResiliencePolicy, ResilientClient};
pub use config::{FxConfig, LoggingConfig};
pub use conversion::{convert_amount, ConversionRequest};
pub use engine::{FxEngine, FxEngineStats};
pub use error::{CallFailure, FxError, FxResult, IntegrationFailure, IntegrationFailureKind};
pub use provider::{CurrencyRecord, ProviderError, Quote, QuoteProvider};
pub use rates::ExchangeRateService;
pub use retry::RetryPolicy;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockQuoteProvider;
