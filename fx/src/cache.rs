//! In-memory caches for provider answers.
//!
//! Entries never expire on their own; they are dropped only through
//! explicit invalidation. Concurrent misses on the same key may both
//! compute, in which case the last write wins. Failed computations are
//! never stored.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ratebridge_common::{CurrencyCode, RatePair};
use serde::Serialize;
use tracing::debug;

use crate::client::Operation;

/// Named cache space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSpace {
    Rates,
    Currencies,
    AllCurrencies,
}

impl CacheSpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheSpace::Rates => "rates",
            CacheSpace::Currencies => "currencies",
            CacheSpace::AllCurrencies => "all-currencies",
        }
    }
}

impl fmt::Display for CacheSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key derived from the operation and its currency arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    operation: Operation,
    codes: Vec<CurrencyCode>,
}

impl CacheKey {
    /// Key that keeps argument order, e.g. `(source, target)`.
    pub fn ordered(operation: Operation, codes: &[CurrencyCode]) -> Self {
        Self {
            operation,
            codes: codes.to_vec(),
        }
    }

    /// Key over the set of codes; order and duplicates are ignored.
    pub fn set(operation: Operation, codes: &[CurrencyCode]) -> Self {
        let mut codes = codes.to_vec();
        codes.sort();
        codes.dedup();
        Self { operation, codes }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn codes(&self) -> &[CurrencyCode] {
        &self.codes
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        for code in &self.codes {
            write!(f, ":{}", code)?;
        }
        Ok(())
    }
}

/// Cached value with its insertion time.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: DateTime<Utc>,
}

/// One typed cache space.
pub struct NamedCache<V> {
    space: CacheSpace,
    entries: DashMap<CacheKey, CacheEntry<V>>,
}

impl<V: Clone> NamedCache<V> {
    pub fn new(space: CacheSpace) -> Self {
        Self {
            space,
            entries: DashMap::new(),
        }
    }

    pub fn space(&self) -> CacheSpace {
        self.space
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Utc::now(),
            },
        );
    }

    /// Return the cached value, or run `compute` and store its success.
    pub async fn get_or_compute<E, F, Fut>(&self, key: CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            debug!(cache = %self.space, key = %key, "Cache hit");
            return Ok(value);
        }

        debug!(cache = %self.space, key = %key, "Cache miss");
        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three caches used by the exchange rate service.
pub struct RateCache {
    pub rates: NamedCache<RatePair>,
    pub currencies: NamedCache<Vec<CurrencyCode>>,
    pub all_currencies: NamedCache<Vec<CurrencyCode>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self {
            rates: NamedCache::new(CacheSpace::Rates),
            currencies: NamedCache::new(CacheSpace::Currencies),
            all_currencies: NamedCache::new(CacheSpace::AllCurrencies),
        }
    }

    /// Drop every entry of one space.
    pub fn invalidate_all(&self, space: CacheSpace) {
        match space {
            CacheSpace::Rates => self.rates.invalidate_all(),
            CacheSpace::Currencies => self.currencies.invalidate_all(),
            CacheSpace::AllCurrencies => self.all_currencies.invalidate_all(),
        }
        debug!(cache = %space, "Cache invalidated");
    }

    /// Clear all spaces.
    pub fn clear(&self) {
        self.rates.invalidate_all();
        self.currencies.invalidate_all();
        self.all_currencies.invalidate_all();
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            rate_entries: self.rates.len(),
            currency_entries: self.currencies.len(),
            all_currency_entries: self.all_currencies.len(),
        }
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub rate_entries: usize,
    pub currency_entries: usize,
    pub all_currency_entries: usize,
}

/// Shared rate cache.
pub type SharedRateCache = Arc<RateCache>;
