//! FX engine error types.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use ratebridge_common::{CurrencyCode, ErrorKind, InputField, NonPositiveRate};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::client::Operation;
use crate::provider::ProviderError;

/// A provider response that cannot be reconciled with the request that
/// produced it. Reflects the request/data, not provider health.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    /// A requested currency is absent from the response.
    #[error("Currency {0} not found in provider response")]
    MissingCurrency(CurrencyCode),

    /// Source and target rates were quoted on different days.
    #[error("Rates quoted on different dates: {source_date} and {target_date}")]
    DateMismatch {
        source_date: NaiveDate,
        target_date: NaiveDate,
    },

    /// A quote is not expressed against the configured pivot currency.
    #[error("Rate for {quote} is based on {base}, expected {expected}")]
    UnexpectedBase {
        quote: String,
        base: String,
        expected: CurrencyCode,
    },

    #[error(transparent)]
    NonPositiveRate(#[from] NonPositiveRate),
}

impl IntegrityViolation {
    /// Integration failure class this violation surfaces as.
    pub fn integration_kind(&self) -> IntegrationFailureKind {
        match self {
            IntegrityViolation::MissingCurrency(_) => IntegrationFailureKind::BadRequest,
            _ => IntegrationFailureKind::InvalidResponse,
        }
    }
}

/// Failure of one resilient call, after timeout, retry and circuit policies
/// have been applied.
#[derive(Debug, Clone, Error)]
pub enum CallFailure {
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },

    #[error("Circuit open for {operation}")]
    CircuitOpen { operation: Operation },

    #[error("{operation} rejected: {limit} calls already in flight")]
    Overloaded { operation: Operation, limit: usize },

    #[error("Transport failure: {0}")]
    Transport(#[from] ProviderError),

    #[error("Data integrity failure: {0}")]
    DataIntegrity(#[from] IntegrityViolation),
}

impl CallFailure {
    /// Check if another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallFailure::Timeout { .. } | CallFailure::Transport(_))
    }

    /// Check if this outcome says something about provider health.
    pub fn counts_against_circuit(&self) -> bool {
        matches!(self, CallFailure::Timeout { .. } | CallFailure::Transport(_))
    }
}

/// Coarse class of an integration failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationFailureKind {
    /// Provider answered but omitted requested data.
    BadRequest,
    /// Provider answered with inconsistent or malformed data.
    InvalidResponse,
    /// Provider could not be reached in time, or its circuit is open.
    Unavailable,
}

impl fmt::Display for IntegrationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntegrationFailureKind::BadRequest => "bad request",
            IntegrationFailureKind::InvalidResponse => "invalid response",
            IntegrationFailureKind::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

/// Classified failure of an exchange rate provider operation.
#[derive(Debug, Clone, Error)]
#[error("Exchange rate integration {kind} during {operation}: {cause}")]
pub struct IntegrationFailure {
    pub kind: IntegrationFailureKind,
    pub operation: Operation,
    #[source]
    pub cause: CallFailure,
}

impl IntegrationFailure {
    /// Classify a call failure.
    pub fn new(operation: Operation, cause: CallFailure) -> Self {
        let kind = match &cause {
            CallFailure::DataIntegrity(violation) => violation.integration_kind(),
            _ => IntegrationFailureKind::Unavailable,
        };

        Self {
            kind,
            operation,
            cause,
        }
    }
}

/// Errors that can occur in the FX engine.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// Caller input is invalid or names currencies the provider does not know.
    #[error("{message}")]
    Validation {
        fields: Vec<InputField>,
        message: String,
    },

    #[error(transparent)]
    Integration(#[from] IntegrationFailure),

    /// Decimal range exceeded during conversion.
    #[error("Arithmetic overflow converting {amount}")]
    ArithmeticOverflow { amount: Decimal },

    /// Raised by the request layer for unknown routes.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Raised by the request layer's admission policy.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

impl FxError {
    /// Create a validation failure.
    pub fn validation(fields: Vec<InputField>, message: impl Into<String>) -> Self {
        FxError::Validation {
            fields,
            message: message.into(),
        }
    }

    /// Map this error onto the boundary taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FxError::Validation { fields, message } => ErrorKind::InputValidation {
                fields: fields.clone(),
                message: message.clone(),
            },
            FxError::Integration(failure) => match failure.kind {
                IntegrationFailureKind::BadRequest | IntegrationFailureKind::InvalidResponse => {
                    ErrorKind::IntegrationBadRequest
                }
                IntegrationFailureKind::Unavailable => ErrorKind::IntegrationUnavailable,
            },
            FxError::NotFound(_) => ErrorKind::NotFound,
            FxError::RateLimited { retry_after } => ErrorKind::RateLimited {
                retry_after: *retry_after,
            },
            FxError::ArithmeticOverflow { .. } => ErrorKind::Unexpected,
        }
    }

    /// Get error code for response bodies.
    pub fn error_code(&self) -> &'static str {
        self.kind().error_code()
    }

    /// Integration failure class, if this is an integration error.
    pub fn integration_kind(&self) -> Option<IntegrationFailureKind> {
        match self {
            FxError::Integration(failure) => Some(failure.kind),
            _ => None,
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
