//! Billing handlers.
//!
//! Command handlers for payment reconciliation and subscription lifecycle:
//!
//! ## Ingress
//! - Mercado Pago webhooks (payments, preapprovals, authorized payments)
//! - PIX settlement notifications
//!
//! ## Settlement
//! - Applying an approved payment to a subscription
//! - Claim-then-apply settlement of one charge
//! - The reconciliation sweeper
//!
//! ## Lifecycle
//! - Cancelling subscriptions
//! - Starting a reactivation checkout

mod apply_approved_payment;
mod cancel_subscription;
mod handle_payment_webhook;
mod handle_pix_webhook;
mod reactivate_subscription;
mod reconcile_pending_charges;
mod settle_charge;

// Settlement
pub use apply_approved_payment::{
    ApplyClientPaymentCommand, ApplyPlatformPaymentCommand, PaymentApplied, PaymentEventProcessor,
};
pub use reconcile_pending_charges::{
    FailedSettlement, ReconcilePendingChargesCommand, ReconcilePendingChargesHandler, SweepReport,
    SweeperSettings,
};
pub use settle_charge::{ChargeSettler, SettlementOutcome};

// Ingress
pub use handle_payment_webhook::{
    HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, WebhookOutcome,
};
pub use handle_pix_webhook::{HandlePixWebhookCommand, HandlePixWebhookHandler, PixWebhookResult};

// Lifecycle
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use reactivate_subscription::{
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReactivateSubscriptionResult,
};
