//! Axum router configuration for billing endpoints.

use std::time::Duration;

use axum::http::HeaderName;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    cancel_subscription, check_pending_payments, handle_mercadopago_webhook, handle_pix_webhook,
    health, reactivate_subscription, BillingAppState,
};

/// Correlation header set on every request and echoed on the response.
///
/// Distinct from `x-request-id`, which the provider signs.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Provider notification routes. No user auth; verified by signature or token.
///
/// # Routes
/// - `POST /mercadopago` - Mercado Pago notifications
/// - `POST /pix` - PIX settlement notifications
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/mercadopago", post(handle_mercadopago_webhook))
        .route("/pix", post(handle_pix_webhook))
}

/// Owner-scoped API routes.
///
/// # Routes
/// - `POST /subscriptions/:id/cancel` - Cancel a subscription
/// - `POST /subscriptions/:id/reactivate` - Start a reactivation checkout
/// - `POST /payments/check-pending` - Settle the caller's paid charges now
pub fn api_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/subscriptions/:id/reactivate", post(reactivate_subscription))
        .route("/payments/check-pending", post(check_pending_payments))
}

/// Complete billing router with state applied.
pub fn billing_router(state: BillingAppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/webhooks", webhook_routes())
        .nest("/api", api_routes())
        .with_state(state)
}

/// Billing router wrapped in the standard middleware stack.
pub fn app(state: BillingAppState, request_timeout: Duration) -> Router {
    let correlation = HeaderName::from_static(CORRELATION_ID_HEADER);

    billing_router(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(correlation.clone()))
        .layer(SetRequestIdLayer::new(correlation, MakeRequestUuid))
}
