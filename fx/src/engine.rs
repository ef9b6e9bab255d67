//! Main FX engine implementation.

use std::sync::Arc;

use ratebridge_common::{ConversionOutcome, CurrencyCode};
use tracing::{debug, info, instrument};

use crate::cache::{CacheSpace, CacheStats, RateCache};
use crate::circuit_breaker::CircuitState;
use crate::client::{Operation, ResilientClient};
use crate::config::FxConfig;
use crate::conversion::{convert_with_pair, ConversionRequest};
use crate::error::FxResult;
use crate::provider::QuoteProvider;
use crate::rates::ExchangeRateService;

/// The main FX engine.
///
/// Entry point for the request-handling layer: validates caller input,
/// resolves rates through [`ExchangeRateService`] and computes conversions.
pub struct FxEngine {
    rates: ExchangeRateService,
    config: FxConfig,
}

impl FxEngine {
    /// Create a new FX engine with the given provider.
    pub fn new(provider: Arc<dyn QuoteProvider>, config: FxConfig) -> Self {
        let client = ResilientClient::new(config.resilience.clone());
        let rates = ExchangeRateService::new(
            provider,
            client,
            Arc::new(RateCache::new()),
            config.pivot_currency.clone(),
        );

        Self { rates, config }
    }

    pub fn config(&self) -> &FxConfig {
        &self.config
    }

    /// Convert raw caller input.
    ///
    /// Syntactic checks run first and report every invalid field together;
    /// the provider is only consulted once the input is well formed.
    #[instrument(skip(self))]
    pub async fn convert(&self, source: &str, target: &str, amount: &str) -> FxResult<ConversionOutcome> {
        let request = ConversionRequest::parse(source, target, amount)?;
        self.convert_request(&request).await
    }

    /// Convert an already parsed request.
    #[instrument(skip(self, request), fields(
        source = %request.source,
        target = %request.target,
        amount = %request.amount
    ))]
    pub async fn convert_request(&self, request: &ConversionRequest) -> FxResult<ConversionOutcome> {
        info!("Conversion started");

        self.rates
            .validate_currencies_exist(&request.source, &request.target)
            .await?;

        let pair = self
            .rates
            .fetch_rate_pair(&request.source, &request.target)
            .await?;
        debug!(
            source_rate = %pair.source_rate.rate,
            target_rate = %pair.target_rate.rate,
            as_of = %pair.as_of,
            "Rates resolved"
        );

        let outcome = convert_with_pair(&request.amount, &pair)?;

        info!(
            converted_amount = %outcome.converted_amount,
            as_of = %outcome.as_of,
            "Conversion completed"
        );

        Ok(outcome)
    }

    /// Every currency the provider supports, sorted.
    pub async fn supported_currencies(&self) -> FxResult<Vec<CurrencyCode>> {
        self.rates.list_all_supported_currencies().await
    }

    /// Drop every cached entry of one space.
    pub fn invalidate_cache(&self, space: CacheSpace) {
        self.rates.invalidate(space);
    }

    pub fn circuit_state(&self, operation: Operation) -> CircuitState {
        self.rates.client().circuit_state(operation)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.rates.cache().stats()
    }

    /// Get engine statistics.
    pub fn stats(&self) -> FxEngineStats {
        FxEngineStats {
            cache_stats: self.cache_stats(),
            circuits: Operation::ALL.map(|operation| (operation, self.circuit_state(operation))),
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone)]
pub struct FxEngineStats {
    pub cache_stats: CacheStats,
    pub circuits: [(Operation, CircuitState); 3],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FxError, IntegrationFailureKind};
    use crate::provider::{MockQuoteProvider, Quote};
    use chrono::NaiveDate;
    use ratebridge_common::{ErrorKind, InputField};
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, day).unwrap()
    }

    fn setup_engine() -> (Arc<MockQuoteProvider>, FxEngine) {
        let provider = Arc::new(MockQuoteProvider::new("test"));

        provider.set_rate("USD", dec!(1.049706), date(20));
        provider.set_rate("GBP", dec!(0.830277), date(20));
        provider.set_rate("PLN", dec!(3.855912), date(20));
        provider.set_rate("CHF", dec!(1.892903), date(20));

        let engine = FxEngine::new(provider.clone(), FxConfig::default());
        (provider, engine)
    }

    fn validation_fields(error: FxError) -> Vec<InputField> {
        match error.kind() {
            ErrorKind::InputValidation { fields, .. } => fields,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_convert() {
        let (_, engine) = setup_engine();

        let outcome = engine.convert("GBP", "USD", "100").await.unwrap();
        assert_eq!(outcome.converted_amount, dec!(126.43));
        assert_eq!(outcome.as_of, date(20));

        let outcome = engine.convert("PLN", "CHF", "5334.53").await.unwrap();
        assert_eq!(outcome.converted_amount, dec!(2618.77));
    }

    #[tokio::test]
    async fn test_outcome_wire_format() {
        let (_, engine) = setup_engine();

        let outcome = engine.convert("GBP", "USD", "100").await.unwrap();
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["convertedAmount"], "126.43");
        assert_eq!(json["date"], "2025-02-20");
    }

    #[tokio::test]
    async fn test_syntax_errors_skip_the_provider() {
        let (provider, engine) = setup_engine();

        let error = engine.convert("usd", "GBP", "0").await.unwrap_err();
        assert_eq!(
            validation_fields(error),
            vec![InputField::SourceCurrency, InputField::Amount]
        );

        let error = engine.convert("USD", "GBP", "10.001").await.unwrap_err();
        assert_eq!(validation_fields(error), vec![InputField::Amount]);

        assert_eq!(provider.currency_calls(), 0);
        assert_eq!(provider.latest_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_currencies() {
        let (provider, engine) = setup_engine();

        let error = engine.convert("XYZ", "USD", "1").await.unwrap_err();
        assert_eq!(validation_fields(error), vec![InputField::SourceCurrency]);

        let error = engine.convert("USD", "XYZ", "1").await.unwrap_err();
        assert_eq!(validation_fields(error), vec![InputField::TargetCurrency]);

        let error = engine.convert("XYZ", "ABC", "1").await.unwrap_err();
        assert_eq!(error.to_string(), "Source and target currencies are not valid");
        assert_eq!(
            validation_fields(error),
            vec![InputField::SourceCurrency, InputField::TargetCurrency]
        );

        // rates are never fetched for unknown currencies
        assert_eq!(provider.latest_calls(), 0);
    }

    #[tokio::test]
    async fn test_date_mismatch_is_bad_request() {
        let (provider, engine) = setup_engine();
        provider.set_quote(Quote {
            base_currency: "EUR".to_string(),
            quote_currency: "USD".to_string(),
            quote: dec!(1.049706),
            date: date(19),
        });

        let error = engine.convert("GBP", "USD", "100").await.unwrap_err();

        assert_eq!(
            error.integration_kind(),
            Some(IntegrationFailureKind::InvalidResponse)
        );
        assert_eq!(error.kind(), ErrorKind::IntegrationBadRequest);
        // not retried, not counted
        assert_eq!(provider.latest_calls(), 1);
        assert_eq!(engine.circuit_state(Operation::LatestRates), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_missing_rate_is_bad_request() {
        let (provider, engine) = setup_engine();
        provider.add_currency("SEK");

        let error = engine.convert("SEK", "USD", "100").await.unwrap_err();

        assert_eq!(
            error.integration_kind(),
            Some(IntegrationFailureKind::BadRequest)
        );
        assert_eq!(error.kind().status_code(), 400);
    }

    #[tokio::test]
    async fn test_cache_hits_and_invalidation() {
        let (provider, engine) = setup_engine();

        engine.convert("GBP", "USD", "100").await.unwrap();
        engine.convert("GBP", "USD", "250").await.unwrap();

        assert_eq!(provider.currency_calls(), 1);
        assert_eq!(provider.latest_calls(), 1);
        assert_eq!(
            engine.cache_stats(),
            CacheStats {
                rate_entries: 1,
                currency_entries: 1,
                all_currency_entries: 0,
            }
        );

        engine.invalidate_cache(CacheSpace::Rates);
        engine.convert("GBP", "USD", "100").await.unwrap();

        assert_eq!(provider.currency_calls(), 1);
        assert_eq!(provider.latest_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_down_is_unavailable() {
        let (provider, engine) = setup_engine();
        provider.fail_next(2, "connection refused");

        let error = engine.convert("GBP", "USD", "100").await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::IntegrationUnavailable);
        assert_eq!(error.kind().status_code(), 503);
        assert_eq!(provider.currency_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast() {
        let (provider, engine) = setup_engine();
        provider.fail_next(6, "service unavailable");

        for _ in 0..3 {
            let error = engine.supported_currencies().await.unwrap_err();
            assert_eq!(error.kind(), ErrorKind::IntegrationUnavailable);
        }
        assert_eq!(engine.circuit_state(Operation::AllCurrencies), CircuitState::Open);

        let error = engine.supported_currencies().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::IntegrationUnavailable);
        assert_eq!(provider.all_currency_calls(), 6);

        // conversions use other operations and are unaffected
        engine.convert("GBP", "USD", "100").await.unwrap();
    }

    #[tokio::test]
    async fn test_supported_currencies() {
        let (provider, engine) = setup_engine();

        let currencies = engine.supported_currencies().await.unwrap();
        let codes: Vec<&str> = currencies.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec!["CHF", "GBP", "PLN", "USD"]);

        engine.supported_currencies().await.unwrap();
        assert_eq!(provider.all_currency_calls(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let (_, engine) = setup_engine();
        engine.supported_currencies().await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.cache_stats.all_currency_entries, 1);
        assert!(stats
            .circuits
            .iter()
            .all(|(_, state)| *state == CircuitState::Closed));
    }
}
