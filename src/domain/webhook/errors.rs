//! Webhook error types for payment provider notifications.
//!
//! Status codes drive the provider's retry behavior:
//! - 2xx: acknowledged, no retry
//! - 4xx: untrusted or malformed, no retry
//! - 5xx: server-side failure, the provider redelivers

use http::StatusCode;
use thiserror::Error;

use crate::domain::billing::BillingError;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature header missing or HMAC mismatch.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature timestamp outside the configured replay window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Shared token on the PIX endpoint missing or wrong.
    #[error("Invalid webhook token")]
    InvalidToken,

    /// Failed to parse the payload or the signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from a recognised envelope.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Fetching the provider resource failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Storage operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Applying the payment failed.
    #[error(transparent)]
    Billing(#[from] BillingError),
}

impl WebhookError {
    /// Returns true if the provider should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Provider(_) | WebhookError::Database(_) => true,
            WebhookError::Billing(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Maps the error to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidToken => StatusCode::UNAUTHORIZED,

            WebhookError::ParseError(_) | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            WebhookError::Provider(_) | WebhookError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // Provider redelivery is how a failed fetch gets retried
            WebhookError::Billing(BillingError::Provider(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            WebhookError::Billing(e) => e.status_code(),
        }
    }
}
