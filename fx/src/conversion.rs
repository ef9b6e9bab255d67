//! Currency conversion request parsing and arithmetic.

use ratebridge_common::{ConversionAmount, ConversionOutcome, CurrencyCode, InputField, RatePair};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{FxError, FxResult};

/// Decimal places kept for the intermediate amount in the pivot currency.
pub const PIVOT_SCALE: u32 = 10;

/// Decimal places of a converted amount.
pub const RESULT_SCALE: u32 = 2;

/// A syntactically valid conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source: CurrencyCode,
    pub target: CurrencyCode,
    pub amount: ConversionAmount,
}

impl ConversionRequest {
    pub fn new(source: CurrencyCode, target: CurrencyCode, amount: ConversionAmount) -> Self {
        Self {
            source,
            target,
            amount,
        }
    }

    /// Parse raw caller input.
    ///
    /// Every invalid field is reported, not just the first one.
    pub fn parse(source: &str, target: &str, amount: &str) -> FxResult<Self> {
        let source = CurrencyCode::parse(source);
        let target = CurrencyCode::parse(target);
        let amount = ConversionAmount::parse(amount);

        match (source, target, amount) {
            (Ok(source), Ok(target), Ok(amount)) => Ok(Self::new(source, target, amount)),
            (source, target, amount) => {
                let mut fields = Vec::new();
                let mut details = Vec::new();

                if let Err(e) = source {
                    fields.push(InputField::SourceCurrency);
                    details.push(format!("{}: {}", InputField::SourceCurrency, e));
                }
                if let Err(e) = target {
                    fields.push(InputField::TargetCurrency);
                    details.push(format!("{}: {}", InputField::TargetCurrency, e));
                }
                if let Err(e) = amount {
                    fields.push(InputField::Amount);
                    details.push(format!("{}: {}", InputField::Amount, e));
                }

                Err(FxError::validation(
                    fields,
                    format!("Invalid input parameters: {}", details.join("; ")),
                ))
            }
        }
    }
}

/// Convert `amount` from the source to the target currency, given both
/// currencies' rates against the pivot.
///
/// The amount is first expressed in the pivot currency, rounded half-up to
/// [`PIVOT_SCALE`] places, then multiplied by the target rate and rounded
/// half-up to exactly [`RESULT_SCALE`] places.
pub fn convert_amount(amount: Decimal, source_rate: Decimal, target_rate: Decimal) -> FxResult<Decimal> {
    let overflow = || FxError::ArithmeticOverflow { amount };

    let in_pivot = amount
        .checked_div(source_rate)
        .ok_or_else(overflow)?
        .round_dp_with_strategy(PIVOT_SCALE, RoundingStrategy::MidpointAwayFromZero);

    let mut converted = in_pivot
        .checked_mul(target_rate)
        .ok_or_else(overflow)?
        .round_dp_with_strategy(RESULT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    converted.rescale(RESULT_SCALE);

    Ok(converted)
}

/// Convert a validated amount with a reconciled rate pair.
pub fn convert_with_pair(amount: &ConversionAmount, pair: &RatePair) -> FxResult<ConversionOutcome> {
    let converted = convert_amount(amount.value(), pair.source_rate.rate, pair.target_rate.rate)?;
    Ok(ConversionOutcome::new(converted, pair.as_of))
}
