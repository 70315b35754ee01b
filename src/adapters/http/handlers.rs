//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to application layer command handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, HandlePaymentWebhookCommand,
    HandlePaymentWebhookHandler, HandlePixWebhookCommand, HandlePixWebhookHandler,
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReconcilePendingChargesCommand,
    ReconcilePendingChargesHandler,
};
use crate::domain::billing::{BillingError, IntegrityError};
use crate::domain::foundation::{ErrorCode, SubscriptionId, Timestamp, UserId, ValidationError};
use crate::domain::webhook::{WebhookError, WebhookQuery};

use super::dto::{
    CheckPendingResponse, ErrorResponse, HealthResponse, PixWebhookResponse, ReactivateResponse,
    WebhookAckResponse,
};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const PIX_TOKEN_HEADER: &str = "x-webhook-token";
pub const USER_ID_HEADER: &str = "x-user-id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state.
///
/// Cloned per request; every handler is behind an `Arc`.
#[derive(Clone)]
pub struct BillingAppState {
    pub payment_webhook: Arc<HandlePaymentWebhookHandler>,
    pub pix_webhook: Arc<HandlePixWebhookHandler>,
    pub cancel_subscription: Arc<CancelSubscriptionHandler>,
    pub reactivate_subscription: Arc<ReactivateSubscriptionHandler>,
    pub reconcile: Arc<ReconcilePendingChargesHandler>,
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Account of the caller, set by the upstream auth layer in `X-User-Id`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn parse_subscription_id(raw: &str) -> Result<SubscriptionId, BillingApiError> {
    raw.parse().map_err(|_| {
        BillingApiError(BillingError::Validation(ValidationError::invalid_format(
            "subscription_id",
            "must be a UUID",
        )))
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Handlers (no auth, verified by signature or token)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/mercadopago - Mercado Pago notifications
pub async fn handle_mercadopago_webhook(
    State(state): State<BillingAppState>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let cmd = HandlePaymentWebhookCommand {
        body: body.to_vec(),
        query,
        x_signature: header(&headers, SIGNATURE_HEADER),
        x_request_id: header(&headers, REQUEST_ID_HEADER),
    };

    let outcome = state.payment_webhook.handle(cmd).await?;

    Ok(Json(WebhookAckResponse::from(outcome)))
}

/// POST /webhooks/pix - PIX settlement notifications
pub async fn handle_pix_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let cmd = HandlePixWebhookCommand {
        body: body.to_vec(),
        token: header(&headers, PIX_TOKEN_HEADER),
    };

    let result = state.pix_webhook.handle(cmd).await?;

    Ok(Json(PixWebhookResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription Handlers (owner-scoped)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/subscriptions/:id/cancel
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = CancelSubscriptionCommand {
        subscription_id: parse_subscription_id(&id)?,
        owner_id: user.user_id,
        now: Timestamp::now(),
    };

    state.cancel_subscription.handle(cmd).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/subscriptions/:id/reactivate
pub async fn reactivate_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ReactivateSubscriptionCommand {
        subscription_id: parse_subscription_id(&id)?,
        owner_id: user.user_id,
    };

    let result = state.reactivate_subscription.handle(cmd).await?;

    Ok(Json(ReactivateResponse {
        payment_url: result.payment_url,
        preference_id: result.preference_id,
    }))
}

/// POST /api/payments/check-pending - Sweep the caller's paid charges
pub async fn check_pending_payments(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ReconcilePendingChargesCommand {
        owner_id: Some(user.user_id),
        now: Timestamp::now(),
    };

    let report = state.reconcile.handle(cmd).await?;

    Ok(Json(CheckPendingResponse::from(&report)))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
pub struct BillingApiError(pub BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let code = self.0.code();

        let body = match &self.0 {
            BillingError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure serving request");
                ErrorResponse::new(ErrorCode::InternalError.to_string(), "Internal error")
            }
            BillingError::Integrity(e @ IntegrityError::MixedScope { .. }) => {
                tracing::error!(error = %e, "Corrupt subscription row");
                ErrorResponse::with_details(
                    code.to_string(),
                    "Subscription data is inconsistent",
                    json!({ "subscription_id": e.subscription_id().to_string() }),
                )
            }
            other => ErrorResponse::new(code.to_string(), other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

/// API error type for webhook endpoints.
///
/// The status code is what the provider sees: 5xx asks for redelivery.
pub struct WebhookApiError(pub WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self.0,
                retryable = self.0.is_retryable(),
                "Webhook processing failed"
            );
        } else if status.is_client_error() {
            tracing::warn!(error = %self.0, "Webhook rejected");
        }

        let code = match &self.0 {
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
            WebhookError::InvalidToken => "INVALID_TOKEN",
            WebhookError::ParseError(_) => "PARSE_ERROR",
            WebhookError::MissingField(_) => "MISSING_FIELD",
            WebhookError::Provider(_) => "PROVIDER_ERROR",
            WebhookError::Database(_) => "DATABASE_ERROR",
            WebhookError::Billing(_) => "PROCESSING_FAILED",
        };

        let message = if status.is_server_error() {
            "Webhook processing failed".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{FieldPresence, SubscriptionKind};
    use crate::domain::foundation::DomainError;

    fn status_of(response: Response) -> StatusCode {
        response.status()
    }

    #[test]
    fn billing_errors_map_to_statuses() {
        assert_eq!(
            status_of(
                BillingApiError(BillingError::SubscriptionNotFound(SubscriptionId::new()))
                    .into_response()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                BillingApiError(BillingError::invalid_state("active", "reactivate")).into_response()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                BillingApiError(BillingError::from(DomainError::database("down"))).into_response()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn integrity_errors_map_to_statuses() {
        let id = SubscriptionId::new();
        let mixed = BillingError::from(IntegrityError::MixedScope {
            id,
            customer: FieldPresence::Set,
            plan: FieldPresence::Null,
        });
        assert_eq!(
            status_of(BillingApiError(mixed).into_response()),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let mismatch = BillingError::from(IntegrityError::KindMismatch {
            id,
            operation: "reactivate_subscription".to_string(),
            expected: SubscriptionKind::Client,
            actual: SubscriptionKind::Platform,
        });
        assert_eq!(
            status_of(BillingApiError(mismatch).into_response()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn webhook_errors_map_to_provider_visible_statuses() {
        assert_eq!(
            status_of(WebhookApiError(WebhookError::InvalidSignature).into_response()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(WebhookApiError(WebhookError::MissingField("data.id")).into_response()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                WebhookApiError(WebhookError::Provider("timeout".to_string())).into_response()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn malformed_subscription_id_is_a_validation_error() {
        let err = parse_subscription_id("nope").err().unwrap();
        assert!(matches!(err.0, BillingError::Validation(_)));
    }
}
