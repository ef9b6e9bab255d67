//! Exchange rate service: provider answers, reconciled and cached.

use std::sync::Arc;

use ratebridge_common::{CurrencyCode, InputField, PivotRate, RatePair};
use tracing::{debug, error, instrument, warn};

use crate::cache::{CacheKey, CacheSpace, SharedRateCache};
use crate::client::{Operation, ResilientClient};
use crate::error::{CallFailure, FxError, FxResult, IntegrationFailure, IntegrityViolation};
use crate::provider::{Quote, QuoteProvider};

/// Fetches pivot-relative rates and currency lists through the resilient
/// client, caching successful answers.
pub struct ExchangeRateService {
    provider: Arc<dyn QuoteProvider>,
    client: ResilientClient,
    cache: SharedRateCache,
    pivot: CurrencyCode,
}

impl ExchangeRateService {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        client: ResilientClient,
        cache: SharedRateCache,
        pivot: CurrencyCode,
    ) -> Self {
        Self {
            provider,
            client,
            cache,
            pivot,
        }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    pub fn cache(&self) -> &SharedRateCache {
        &self.cache
    }

    pub fn pivot(&self) -> &CurrencyCode {
        &self.pivot
    }

    /// Check that the provider knows both currencies.
    ///
    /// Fails with a validation error naming exactly the unknown fields.
    #[instrument(skip(self), fields(source = %source, target = %target))]
    pub async fn validate_currencies_exist(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
    ) -> FxResult<()> {
        let codes = [source.clone(), target.clone()];
        let key = CacheKey::set(Operation::CurrencyExistence, &codes);
        let codes = &codes;

        let existing = self
            .cache
            .currencies
            .get_or_compute(key, move || async move {
                self.client
                    .call(Operation::CurrencyExistence, move || self.existing_once(codes))
                    .await
                    .map_err(|failure| self.integration_failure(Operation::CurrencyExistence, failure))
            })
            .await?;

        let source_known = existing.contains(source);
        let target_known = existing.contains(target);

        let (fields, message) = match (source_known, target_known) {
            (true, true) => return Ok(()),
            (false, true) => (
                vec![InputField::SourceCurrency],
                "Source currency is not valid",
            ),
            (true, false) => (
                vec![InputField::TargetCurrency],
                "Target currency is not valid",
            ),
            (false, false) => (
                vec![InputField::SourceCurrency, InputField::TargetCurrency],
                "Source and target currencies are not valid",
            ),
        };

        debug!(?fields, "Unknown currency requested");
        Err(FxError::validation(fields, message))
    }

    /// Fetch both currencies' rates against the pivot, quoted on one date.
    #[instrument(skip(self), fields(source = %source, target = %target))]
    pub async fn fetch_rate_pair(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
    ) -> FxResult<RatePair> {
        let codes = [source.clone(), target.clone()];
        let key = CacheKey::ordered(Operation::LatestRates, &codes);

        self.cache
            .rates
            .get_or_compute(key, move || async move {
                self.client
                    .call(Operation::LatestRates, move || self.rate_pair_once(source, target))
                    .await
                    .map_err(|failure| self.integration_failure(Operation::LatestRates, failure))
            })
            .await
    }

    /// Every currency the provider supports, sorted.
    ///
    /// Entries that are not valid currency codes are left out.
    #[instrument(skip(self))]
    pub async fn list_all_supported_currencies(&self) -> FxResult<Vec<CurrencyCode>> {
        let key = CacheKey::set(Operation::AllCurrencies, &[]);

        self.cache
            .all_currencies
            .get_or_compute(key, move || async move {
                self.client
                    .call(Operation::AllCurrencies, move || self.all_currencies_once())
                    .await
                    .map_err(|failure| self.integration_failure(Operation::AllCurrencies, failure))
            })
            .await
    }

    /// Drop every cached entry of one space.
    pub fn invalidate(&self, space: CacheSpace) {
        self.cache.invalidate_all(space);
    }

    async fn existing_once(&self, codes: &[CurrencyCode]) -> Result<Vec<CurrencyCode>, CallFailure> {
        let records = self.provider.currencies(codes).await?;

        // anything the provider echoes back outside the request is ignored
        Ok(codes
            .iter()
            .filter(|code| records.iter().any(|record| record.code == code.code()))
            .cloned()
            .collect())
    }

    async fn rate_pair_once(
        &self,
        source: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<RatePair, CallFailure> {
        let quotes = self
            .provider
            .latest(&[source.clone(), target.clone()])
            .await?;
        Ok(reconcile_rate_pair(&quotes, source, target, &self.pivot)?)
    }

    async fn all_currencies_once(&self) -> Result<Vec<CurrencyCode>, CallFailure> {
        let records = self.provider.all_currencies().await?;

        let mut codes: Vec<CurrencyCode> = records
            .iter()
            .filter_map(|record| match CurrencyCode::parse(&record.code) {
                Ok(code) => Some(code),
                Err(_) => {
                    warn!(
                        provider = self.provider.name(),
                        code = %record.code,
                        "Skipping malformed currency code"
                    );
                    None
                }
            })
            .collect();
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    fn integration_failure(&self, operation: Operation, failure: CallFailure) -> FxError {
        let failure = IntegrationFailure::new(operation, failure);
        match &failure.cause {
            CallFailure::DataIntegrity(_) => warn!(
                provider = self.provider.name(),
                operation = %operation,
                error = %failure.cause,
                "Provider returned unusable data"
            ),
            _ => error!(
                provider = self.provider.name(),
                operation = %operation,
                error = %failure.cause,
                "Exchange rate integration failed"
            ),
        }
        failure.into()
    }
}

/// Build a rate pair out of a `latest` answer.
///
/// Both currencies must be present, quoted against `pivot`, positive and on
/// the same date.
pub fn reconcile_rate_pair(
    quotes: &[Quote],
    source: &CurrencyCode,
    target: &CurrencyCode,
    pivot: &CurrencyCode,
) -> Result<RatePair, IntegrityViolation> {
    let source_quote = find_quote(quotes, source, pivot)?;
    let target_quote = find_quote(quotes, target, pivot)?;

    if source_quote.date != target_quote.date {
        return Err(IntegrityViolation::DateMismatch {
            source_date: source_quote.date,
            target_date: target_quote.date,
        });
    }

    Ok(RatePair::new(
        PivotRate::new(source.clone(), source_quote.quote)?,
        PivotRate::new(target.clone(), target_quote.quote)?,
        source_quote.date,
    ))
}

fn find_quote<'a>(
    quotes: &'a [Quote],
    code: &CurrencyCode,
    pivot: &CurrencyCode,
) -> Result<&'a Quote, IntegrityViolation> {
    let quote = quotes
        .iter()
        .find(|quote| quote.quote_currency == code.code())
        .ok_or_else(|| IntegrityViolation::MissingCurrency(code.clone()))?;

    if quote.base_currency != pivot.code() {
        return Err(IntegrityViolation::UnexpectedBase {
            quote: quote.quote_currency.clone(),
            base: quote.base_currency.clone(),
            expected: pivot.clone(),
        });
    }

    Ok(quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RateCache;
    use crate::client::ResiliencePolicy;
    use crate::error::IntegrationFailureKind;
    use crate::provider::MockQuoteProvider;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, day).unwrap()
    }

    fn quote(base: &str, code: &str, rate: rust_decimal::Decimal, day: u32) -> Quote {
        Quote {
            base_currency: base.to_string(),
            quote_currency: code.to_string(),
            quote: rate,
            date: date(day),
        }
    }

    fn service() -> (Arc<MockQuoteProvider>, ExchangeRateService) {
        let provider = Arc::new(MockQuoteProvider::new("test"));
        provider.set_rate("USD", dec!(1.049706), date(20));
        provider.set_rate("GBP", dec!(0.830277), date(20));

        let service = ExchangeRateService::new(
            provider.clone(),
            ResilientClient::new(ResiliencePolicy::default()),
            Arc::new(RateCache::new()),
            CurrencyCode::eur(),
        );
        (provider, service)
    }

    fn code(code: &str) -> CurrencyCode {
        CurrencyCode::parse(code).unwrap()
    }

    #[test]
    fn test_reconcile_rate_pair() {
        let quotes = [
            quote("EUR", "GBP", dec!(0.830277), 20),
            quote("EUR", "USD", dec!(1.049706), 20),
        ];

        let pair =
            reconcile_rate_pair(&quotes, &CurrencyCode::usd(), &CurrencyCode::gbp(), &CurrencyCode::eur())
                .unwrap();

        assert_eq!(pair.source_rate.currency, CurrencyCode::usd());
        assert_eq!(pair.source_rate.rate, dec!(1.049706));
        assert_eq!(pair.target_rate.rate, dec!(0.830277));
        assert_eq!(pair.as_of, date(20));
    }

    #[test]
    fn test_reconcile_rejects_inconsistent_answers() {
        let eur = CurrencyCode::eur();
        let usd = CurrencyCode::usd();
        let gbp = CurrencyCode::gbp();

        let missing = [quote("EUR", "USD", dec!(1.05), 20)];
        assert_eq!(
            reconcile_rate_pair(&missing, &usd, &gbp, &eur),
            Err(IntegrityViolation::MissingCurrency(gbp.clone()))
        );

        let mismatch = [
            quote("EUR", "USD", dec!(1.05), 19),
            quote("EUR", "GBP", dec!(0.83), 20),
        ];
        assert!(matches!(
            reconcile_rate_pair(&mismatch, &usd, &gbp, &eur),
            Err(IntegrityViolation::DateMismatch { .. })
        ));

        let wrong_base = [
            quote("USD", "USD", dec!(1), 20),
            quote("EUR", "GBP", dec!(0.83), 20),
        ];
        assert!(matches!(
            reconcile_rate_pair(&wrong_base, &usd, &gbp, &eur),
            Err(IntegrityViolation::UnexpectedBase { .. })
        ));

        let zero = [
            quote("EUR", "USD", dec!(0), 20),
            quote("EUR", "GBP", dec!(0.83), 20),
        ];
        assert!(matches!(
            reconcile_rate_pair(&zero, &usd, &gbp, &eur),
            Err(IntegrityViolation::NonPositiveRate(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_known_currencies() {
        let (provider, service) = service();

        service
            .validate_currencies_exist(&CurrencyCode::usd(), &CurrencyCode::gbp())
            .await
            .unwrap();
        // cached regardless of argument order
        service
            .validate_currencies_exist(&CurrencyCode::gbp(), &CurrencyCode::usd())
            .await
            .unwrap();

        assert_eq!(provider.currency_calls(), 1);
    }

    #[tokio::test]
    async fn test_validate_names_unknown_fields() {
        let (_, service) = service();
        let cases = [
            ("XYZ", "USD", vec![InputField::SourceCurrency], "Source currency is not valid"),
            ("USD", "XYZ", vec![InputField::TargetCurrency], "Target currency is not valid"),
            (
                "XYZ",
                "ABC",
                vec![InputField::SourceCurrency, InputField::TargetCurrency],
                "Source and target currencies are not valid",
            ),
        ];

        for (source, target, expected_fields, expected_message) in cases {
            let error = service
                .validate_currencies_exist(&code(source), &code(target))
                .await
                .unwrap_err();

            match error {
                FxError::Validation { fields, message } => {
                    assert_eq!(fields, expected_fields);
                    assert_eq!(message, expected_message);
                }
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_rate_pair_is_cached_per_direction() {
        let (provider, service) = service();

        let pair = service
            .fetch_rate_pair(&CurrencyCode::gbp(), &CurrencyCode::usd())
            .await
            .unwrap();
        assert_eq!(pair.source_rate.rate, dec!(0.830277));

        service
            .fetch_rate_pair(&CurrencyCode::gbp(), &CurrencyCode::usd())
            .await
            .unwrap();
        assert_eq!(provider.latest_calls(), 1);

        let reversed = service
            .fetch_rate_pair(&CurrencyCode::usd(), &CurrencyCode::gbp())
            .await
            .unwrap();
        assert_eq!(reversed.source_rate.rate, dec!(1.049706));
        assert_eq!(provider.latest_calls(), 2);

        service.invalidate(CacheSpace::Rates);
        service
            .fetch_rate_pair(&CurrencyCode::gbp(), &CurrencyCode::usd())
            .await
            .unwrap();
        assert_eq!(provider.latest_calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_rate_is_bad_request_and_not_cached() {
        let (provider, service) = service();
        provider.add_currency("CHF");

        let error = service
            .fetch_rate_pair(&CurrencyCode::usd(), &code("CHF"))
            .await
            .unwrap_err();

        assert_eq!(
            error.integration_kind(),
            Some(IntegrationFailureKind::BadRequest)
        );
        assert_eq!(provider.latest_calls(), 1);
        assert!(service.cache().rates.is_empty());
    }

    #[tokio::test]
    async fn test_list_all_supported_currencies() {
        let (provider, service) = service();
        provider.add_currency("CHF");

        let all = service.list_all_supported_currencies().await.unwrap();
        assert_eq!(all, vec![code("CHF"), code("GBP"), code("USD")]);

        service.list_all_supported_currencies().await.unwrap();
        assert_eq!(provider.all_currency_calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_codes_are_left_out() {
        let (provider, service) = service();
        provider.add_raw_currency("usd");
        provider.add_raw_currency("EURO");

        let all = service.list_all_supported_currencies().await.unwrap();

        assert_eq!(all, vec![code("GBP"), code("USD")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_outage_is_unavailable() {
        let (provider, service) = service();
        provider.fail_next(2, "connection refused");

        let error = service.list_all_supported_currencies().await.unwrap_err();

        assert_eq!(
            error.integration_kind(),
            Some(IntegrationFailureKind::Unavailable)
        );
        assert_eq!(provider.all_currency_calls(), 2);
        assert!(service.cache().all_currencies.is_empty());
    }
}
