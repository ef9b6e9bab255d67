//! Error taxonomy shared with the request-handling boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Caller-supplied input that can be named in a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputField {
    #[serde(rename = "sourceCurrency")]
    SourceCurrency,
    #[serde(rename = "targetCurrency")]
    TargetCurrency,
    #[serde(rename = "amount")]
    Amount,
}

impl InputField {
    /// Parameter name as seen by API callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputField::SourceCurrency => "sourceCurrency",
            InputField::TargetCurrency => "targetCurrency",
            InputField::Amount => "amount",
        }
    }
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of failure kinds a core operation can end in.
///
/// The boundary pattern-matches on this to pick a transport status; see
/// [`ErrorKind::status_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Amount or currency syntactically invalid, or resolved not to exist.
    InputValidation {
        fields: Vec<InputField>,
        message: String,
    },
    /// Provider answered, but the answer lacks or garbles the requested data.
    IntegrationBadRequest,
    /// Provider failed, timed out, or its circuit is open.
    IntegrationUnavailable,
    NotFound,
    /// Inbound admission policy rejected the request.
    RateLimited { retry_after: Duration },
    Unexpected,
}

impl ErrorKind {
    /// Suggested transport status.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::InputValidation { .. } => 400,
            ErrorKind::IntegrationBadRequest => 400,
            ErrorKind::IntegrationUnavailable => 503,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited { .. } => 429,
            ErrorKind::Unexpected => 500,
        }
    }

    /// Get error code for response bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::InputValidation { .. } => "VALIDATION_ERROR",
            ErrorKind::IntegrationBadRequest => "BAD_REQUEST",
            ErrorKind::IntegrationUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimited { .. } => "TOO_MANY_REQUESTS",
            ErrorKind::Unexpected => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Message safe to show to API callers. Internal detail is never included.
    pub fn message(&self) -> String {
        match self {
            ErrorKind::InputValidation { message, .. } => message.clone(),
            ErrorKind::IntegrationBadRequest => {
                "Bad request to exchange rate integration".to_string()
            }
            ErrorKind::IntegrationUnavailable => "Service temporarily unavailable".to_string(),
            ErrorKind::NotFound => "Resource not found".to_string(),
            ErrorKind::RateLimited { .. } => format!(
                "Too many requests. Try again in about {} seconds",
                self.retry_after_secs().unwrap_or(0)
            ),
            ErrorKind::Unexpected => "Something went wrong".to_string(),
        }
    }

    /// Whole seconds for a `Retry-After` header, when applicable.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ErrorKind::RateLimited { retry_after } => Some(retry_after.as_secs()),
            _ => None,
        }
    }

    /// Build the response body for this failure.
    pub fn to_body(&self) -> ErrorBody {
        let fields = match self {
            ErrorKind::InputValidation { fields, .. } => Some(fields.clone()),
            _ => None,
        };

        ErrorBody {
            code: self.error_code().to_string(),
            message: self.message(),
            fields,
        }
    }
}

/// Response body rendered by the boundary for a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<InputField>>,
}
