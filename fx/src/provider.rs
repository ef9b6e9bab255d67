//! Quote provider contract and test double.

use async_trait::async_trait;
use chrono::NaiveDate;
use ratebridge_common::CurrencyCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One pivot-relative quote as returned by the provider.
///
/// `quote` is how much of `quote_currency` one unit of `base_currency` buys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub base_currency: String,
    pub quote_currency: String,
    pub quote: Decimal,
    pub date: NaiveDate,
}

/// A currency known to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRecord {
    pub code: String,
}

/// Opaque transport-level failure from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Trait for the external exchange rate provider.
///
/// Implementations only do the remote call; timeouts, retries and circuit
/// breaking are layered on by [`crate::client::ResilientClient`].
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Latest pivot-relative quotes for the given currencies.
    async fn latest(&self, codes: &[CurrencyCode]) -> Result<Vec<Quote>, ProviderError>;

    /// The subset of `codes` the provider supports.
    async fn currencies(&self, codes: &[CurrencyCode])
        -> Result<Vec<CurrencyRecord>, ProviderError>;

    /// Every currency the provider supports.
    async fn all_currencies(&self) -> Result<Vec<CurrencyRecord>, ProviderError>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockQuoteProvider;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use dashmap::DashMap;
    use parking_lot::{Mutex, RwLock};

    use super::*;

    /// Scripted in-memory provider with call counters.
    pub struct MockQuoteProvider {
        name: String,
        pivot: CurrencyCode,
        quotes: DashMap<String, Quote>,
        supported: RwLock<BTreeSet<CurrencyCode>>,
        unparsed: RwLock<Vec<String>>,
        failures: Mutex<VecDeque<ProviderError>>,
        latency: Mutex<Option<Duration>>,
        latest_calls: AtomicUsize,
        currency_calls: AtomicUsize,
        all_currency_calls: AtomicUsize,
    }

    impl MockQuoteProvider {
        /// Create a new mock provider quoting against EUR.
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                pivot: CurrencyCode::eur(),
                quotes: DashMap::new(),
                supported: RwLock::new(BTreeSet::new()),
                unparsed: RwLock::new(Vec::new()),
                failures: Mutex::new(VecDeque::new()),
                latency: Mutex::new(None),
                latest_calls: AtomicUsize::new(0),
                currency_calls: AtomicUsize::new(0),
                all_currency_calls: AtomicUsize::new(0),
            }
        }

        /// Set the pivot rate for a currency and mark it supported.
        pub fn set_rate(&self, code: &str, rate: Decimal, date: NaiveDate) {
            self.set_quote(Quote {
                base_currency: self.pivot.code().to_string(),
                quote_currency: code.to_string(),
                quote: rate,
                date,
            });
            self.add_currency(code);
        }

        /// Store a raw quote as-is, without marking anything supported.
        pub fn set_quote(&self, quote: Quote) {
            self.quotes.insert(quote.quote_currency.clone(), quote);
        }

        /// Mark a currency supported without quoting it.
        pub fn add_currency(&self, code: &str) {
            if let Ok(code) = CurrencyCode::parse(code) {
                self.supported.write().insert(code);
            }
        }

        /// List a raw, unvalidated code in `all_currencies` answers.
        pub fn add_raw_currency(&self, code: &str) {
            self.unparsed.write().push(code.to_string());
        }

        /// Make the next `count` calls, of any operation, fail.
        pub fn fail_next(&self, count: usize, message: &str) {
            let mut failures = self.failures.lock();
            for _ in 0..count {
                failures.push_back(ProviderError::new(message));
            }
        }

        /// Delay every response by `latency`.
        pub fn set_latency(&self, latency: Duration) {
            *self.latency.lock() = Some(latency);
        }

        pub fn latest_calls(&self) -> usize {
            self.latest_calls.load(Ordering::SeqCst)
        }

        pub fn currency_calls(&self) -> usize {
            self.currency_calls.load(Ordering::SeqCst)
        }

        pub fn all_currency_calls(&self) -> usize {
            self.all_currency_calls.load(Ordering::SeqCst)
        }

        async fn respond(&self) -> Result<(), ProviderError> {
            let latency = *self.latency.lock();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            match self.failures.lock().pop_front() {
                Some(failure) => Err(failure),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl QuoteProvider for MockQuoteProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn latest(&self, codes: &[CurrencyCode]) -> Result<Vec<Quote>, ProviderError> {
            self.latest_calls.fetch_add(1, Ordering::SeqCst);
            self.respond().await?;

            Ok(codes
                .iter()
                .filter_map(|code| self.quotes.get(code.code()).map(|q| q.clone()))
                .collect())
        }

        async fn currencies(
            &self,
            codes: &[CurrencyCode],
        ) -> Result<Vec<CurrencyRecord>, ProviderError> {
            self.currency_calls.fetch_add(1, Ordering::SeqCst);
            self.respond().await?;

            let supported = self.supported.read();
            Ok(codes
                .iter()
                .filter(|code| supported.contains(*code))
                .map(|code| CurrencyRecord {
                    code: code.to_string(),
                })
                .collect())
        }

        async fn all_currencies(&self) -> Result<Vec<CurrencyRecord>, ProviderError> {
            self.all_currency_calls.fetch_add(1, Ordering::SeqCst);
            self.respond().await?;

            let mut records: Vec<CurrencyRecord> = self
                .supported
                .read()
                .iter()
                .map(|code| CurrencyRecord {
                    code: code.to_string(),
                })
                .collect();
            records.extend(
                self.unparsed
                    .read()
                    .iter()
                    .map(|code| CurrencyRecord { code: code.clone() }),
            );
            Ok(records)
        }
    }
}
