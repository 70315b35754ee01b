//! Application layer - Commands and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod handlers;

pub use handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, ChargeSettler,
    HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, HandlePixWebhookCommand,
    HandlePixWebhookHandler, PaymentEventProcessor, ReactivateSubscriptionCommand,
    ReactivateSubscriptionHandler, ReconcilePendingChargesCommand, ReconcilePendingChargesHandler,
    SweepReport, SweeperSettings,
};
