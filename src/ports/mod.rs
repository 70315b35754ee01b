//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `SubscriptionRepository` - Platform and client subscriptions (one table)
//! - `ChargeRepository` - Provider transactions and the idempotency claim
//! - `LedgerRepository` - Merchant-facing revenue entries
//!
//! ## Provider Ports
//!
//! - `PaymentGateway` - Mercado Pago resource fetches and checkout creation

mod charge_repository;
mod ledger_repository;
mod payment_gateway;
mod subscription_repository;

pub use charge_repository::ChargeRepository;
pub use ledger_repository::LedgerRepository;
pub use payment_gateway::{
    CheckoutPreference, CheckoutPreferenceRequest, PaymentError, PaymentErrorCode, PaymentGateway,
    PreapprovalStatus, ProviderAuthorizedPayment, ProviderPayment, ProviderPaymentStatus,
    ProviderPreapproval,
};
pub use subscription_repository::SubscriptionRepository;
