//! HTTP adapter for billing endpoints.
//!
//! - `POST /webhooks/mercadopago` - Mercado Pago notifications
//! - `POST /webhooks/pix` - PIX notifications
//! - `POST /api/subscriptions/:id/cancel` - Cancel a subscription
//! - `POST /api/subscriptions/:id/reactivate` - Start a reactivation checkout
//! - `POST /api/payments/check-pending` - Owner-scoped sweep
//! - `GET /health` - Liveness

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState, WebhookApiError};
pub use routes::{app, billing_router};
