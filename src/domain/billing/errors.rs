//! Billing error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | SubscriptionNotFound | 404 |
//! | OwnerMismatch | 403 |
//! | Integrity (mixed scope) | 500 |
//! | Integrity (kind mismatch) | 422 |
//! | InvalidState | 409 |
//! | Validation | 400 |
//! | Provider | 502 |
//! | Storage | 500 |

use http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, ValidationError};

use super::IntegrityError;

/// Errors raised by billing operations.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Subscription {subscription_id} does not belong to the payment's account")]
    OwnerMismatch { subscription_id: SubscriptionId },

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("Cannot {attempted} a subscription that is {current}")]
    InvalidState { current: String, attempted: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Storage(#[from] DomainError),
}

impl BillingError {
    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::SubscriptionNotFound(_) => ErrorCode::SubscriptionNotFound,
            BillingError::OwnerMismatch { .. } => ErrorCode::Forbidden,
            BillingError::Integrity(_) => ErrorCode::IntegrityViolation,
            BillingError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            BillingError::Validation(_) => ErrorCode::ValidationFailed,
            BillingError::Provider(_) => ErrorCode::ExternalServiceError,
            BillingError::Storage(e) => e.code,
        }
    }

    /// HTTP status for API responses.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BillingError::SubscriptionNotFound(_) => StatusCode::NOT_FOUND,
            BillingError::OwnerMismatch { .. } => StatusCode::FORBIDDEN,
            BillingError::Integrity(IntegrityError::MixedScope { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BillingError::Integrity(IntegrityError::KindMismatch { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BillingError::InvalidState { .. } => StatusCode::CONFLICT,
            BillingError::Validation(_) => StatusCode::BAD_REQUEST,
            BillingError::Provider(_) => StatusCode::BAD_GATEWAY,
            BillingError::Storage(e) if e.code == ErrorCode::SubscriptionNotFound => {
                StatusCode::NOT_FOUND
            }
            BillingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a webhook that hit this error should be retried by the provider.
    ///
    /// Corruption and bad metadata will not fix themselves on redelivery.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Provider(_) | BillingError::Storage(_))
    }
}
