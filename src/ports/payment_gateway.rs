//! Payment gateway port for the Mercado Pago REST API.
//!
//! Webhooks only carry a resource id; the handler fetches the current resource
//! state through this port before acting on it.
//!
//! # Design
//!
//! - **Read-mostly**: payments, preapprovals and authorized payments are fetched, never mutated
//! - **Checkout**: the only write is creating a checkout preference
//! - **Provider-shaped**: amounts are converted to cents and timestamps to UTC at the adapter

use crate::domain::billing::{BillingError, PaymentMethod};
use crate::domain::foundation::Timestamp;
use crate::domain::webhook::WebhookError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Port for the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetch a one-shot payment (`/v1/payments/{id}`).
    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment, PaymentError>;

    /// Fetch a recurring mandate (`/preapproval/{id}`).
    async fn get_preapproval(
        &self,
        preapproval_id: &str,
    ) -> Result<ProviderPreapproval, PaymentError>;

    /// Fetch one charge of a mandate (`/authorized_payments/{id}`).
    async fn get_authorized_payment(
        &self,
        authorized_payment_id: &str,
    ) -> Result<ProviderAuthorizedPayment, PaymentError>;

    /// Create a checkout preference (`/checkout/preferences`).
    async fn create_checkout_preference(
        &self,
        request: CheckoutPreferenceRequest,
    ) -> Result<CheckoutPreference, PaymentError>;
}

/// Payment status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPaymentStatus {
    Pending,
    Approved,
    Authorized,
    InProcess,
    InMediation,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    Unknown,
}

impl ProviderPaymentStatus {
    pub fn from_provider(status: &str) -> Self {
        match status {
            "pending" => ProviderPaymentStatus::Pending,
            "approved" => ProviderPaymentStatus::Approved,
            "authorized" => ProviderPaymentStatus::Authorized,
            "in_process" => ProviderPaymentStatus::InProcess,
            "in_mediation" => ProviderPaymentStatus::InMediation,
            "rejected" => ProviderPaymentStatus::Rejected,
            "cancelled" | "canceled" => ProviderPaymentStatus::Cancelled,
            "refunded" => ProviderPaymentStatus::Refunded,
            "charged_back" => ProviderPaymentStatus::ChargedBack,
            _ => ProviderPaymentStatus::Unknown,
        }
    }

    /// Only approved payments may mutate a subscription.
    pub fn is_approved(&self) -> bool {
        matches!(self, ProviderPaymentStatus::Approved)
    }

    /// Terminal failure states that close a pending charge.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            ProviderPaymentStatus::Rejected
                | ProviderPaymentStatus::Cancelled
                | ProviderPaymentStatus::Refunded
                | ProviderPaymentStatus::ChargedBack
        )
    }
}

/// A one-shot payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    pub status: ProviderPaymentStatus,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub date_created: Option<Timestamp>,
    pub date_approved: Option<Timestamp>,
    /// PIX expiry, when the provider reports one.
    pub date_of_expiration: Option<Timestamp>,
    /// Checkout metadata, merged with a JSON `external_reference` when present.
    pub metadata: Value,
    pub external_reference: Option<String>,
}

impl ProviderPayment {
    /// When the money moved: `date_approved`, else `date_created`, else `fallback`.
    pub fn payment_date(&self, fallback: Timestamp) -> Timestamp {
        self.date_approved.or(self.date_created).unwrap_or(fallback)
    }
}

/// Mandate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreapprovalStatus {
    Pending,
    Authorized,
    Paused,
    Cancelled,
    Unknown,
}

impl PreapprovalStatus {
    pub fn from_provider(status: &str) -> Self {
        match status {
            "pending" => PreapprovalStatus::Pending,
            "authorized" => PreapprovalStatus::Authorized,
            "paused" => PreapprovalStatus::Paused,
            "cancelled" | "canceled" => PreapprovalStatus::Cancelled,
            _ => PreapprovalStatus::Unknown,
        }
    }
}

/// A recurring card mandate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPreapproval {
    pub id: String,
    pub status: PreapprovalStatus,
    pub reason: Option<String>,
    pub amount_cents: i64,
    pub date_created: Timestamp,
    pub metadata: Value,
    pub external_reference: Option<String>,
}

/// One charge of a mandate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAuthorizedPayment {
    pub id: String,
    pub preapproval_id: String,
    pub amount_cents: i64,
    /// Status of the underlying payment.
    pub payment_status: ProviderPaymentStatus,
    pub payment_id: Option<String>,
    pub date_created: Option<Timestamp>,
    pub debit_date: Option<Timestamp>,
}

impl ProviderAuthorizedPayment {
    pub fn payment_date(&self, fallback: Timestamp) -> Timestamp {
        self.debit_date.or(self.date_created).unwrap_or(fallback)
    }
}

/// Request to create a checkout preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutPreferenceRequest {
    pub title: String,
    pub amount_cents: i64,
    pub external_reference: String,
    pub metadata: Value,
}

/// Created checkout preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPreference {
    pub id: String,
    /// URL the payer is redirected to.
    pub init_point: String,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    /// Create a new payment error.
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Create with provider code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::AuthenticationError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::InvalidResponse, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for BillingError {
    fn from(err: PaymentError) -> Self {
        BillingError::Provider(err.to_string())
    }
}

impl From<PaymentError> for WebhookError {
    fn from(err: PaymentError) -> Self {
        WebhookError::Provider(err.to_string())
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network connectivity issue or timeout.
    NetworkError,

    /// Access token rejected.
    AuthenticationError,

    /// Resource not found.
    NotFound,

    /// Rate limit exceeded.
    RateLimitExceeded,

    /// Request rejected as invalid.
    InvalidRequest,

    /// Response body could not be decoded.
    InvalidResponse,

    /// Provider API error (5xx).
    ProviderError,

    /// Unknown error.
    Unknown,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentErrorCode::NetworkError
                | PaymentErrorCode::RateLimitExceeded
                | PaymentErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::NetworkError => "network_error",
            PaymentErrorCode::AuthenticationError => "authentication_error",
            PaymentErrorCode::NotFound => "not_found",
            PaymentErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PaymentErrorCode::InvalidRequest => "invalid_request",
            PaymentErrorCode::InvalidResponse => "invalid_response",
            PaymentErrorCode::ProviderError => "provider_error",
            PaymentErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
