//! HTTP integration tests for the billing router.
//!
//! Drives the full Axum router with in-memory adapters via `tower::ServiceExt`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use subscription_reconciler::adapters::http::{billing_router, BillingAppState};
use subscription_reconciler::adapters::memory::{
    InMemoryChargeRepository, InMemoryLedgerRepository, InMemorySubscriptionRepository,
};
use subscription_reconciler::adapters::mercadopago::MockPaymentGateway;
use subscription_reconciler::application::handlers::billing::{
    CancelSubscriptionHandler, ChargeSettler, HandlePaymentWebhookHandler, HandlePixWebhookHandler,
    PaymentEventProcessor, ReactivateSubscriptionHandler, ReconcilePendingChargesHandler,
    SweeperSettings,
};
use subscription_reconciler::domain::billing::{
    BillingTerm, Charge, PaymentMethod, ProviderCharge, SubscriptionCore, SubscriptionRecord,
    SubscriptionStatus,
};
use subscription_reconciler::domain::foundation::{
    CustomerId, PlanId, SubscriptionId, Timestamp, UserId,
};
use subscription_reconciler::domain::webhook::{build_manifest, MercadoPagoSignatureVerifier};
use subscription_reconciler::ports::{
    ChargeRepository, ProviderPayment, ProviderPaymentStatus, SubscriptionRepository,
};

const SECRET: &str = "http-secret";
const PIX_TOKEN: &str = "pix-token";
const MERCHANT: &str = "merchant-http";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestApp {
    router: Router,
    subscriptions: InMemorySubscriptionRepository,
    charges: InMemoryChargeRepository,
    gateway: MockPaymentGateway,
}

fn test_app() -> TestApp {
    let subscriptions = InMemorySubscriptionRepository::new();
    let charges = InMemoryChargeRepository::new();
    let ledger = InMemoryLedgerRepository::new();
    let gateway = MockPaymentGateway::new();

    let processor =
        PaymentEventProcessor::new(Arc::new(subscriptions.clone()), Arc::new(ledger.clone()));
    let settler = Arc::new(ChargeSettler::new(Arc::new(charges.clone()), processor));

    let state = BillingAppState {
        payment_webhook: Arc::new(HandlePaymentWebhookHandler::new(
            MercadoPagoSignatureVerifier::new(Some(SecretString::new(SECRET.to_string()))),
            Arc::new(gateway.clone()),
            Arc::new(charges.clone()),
            settler.clone(),
        )),
        pix_webhook: Arc::new(HandlePixWebhookHandler::new(
            Some(SecretString::new(PIX_TOKEN.to_string())),
            Arc::new(charges.clone()),
            settler.clone(),
        )),
        cancel_subscription: Arc::new(CancelSubscriptionHandler::new(Arc::new(
            subscriptions.clone(),
        ))),
        reactivate_subscription: Arc::new(ReactivateSubscriptionHandler::new(
            Arc::new(subscriptions.clone()),
            Arc::new(gateway.clone()),
        )),
        reconcile: Arc::new(ReconcilePendingChargesHandler::new(
            Arc::new(charges.clone()),
            Arc::new(gateway.clone()),
            settler,
            SweeperSettings::default(),
        )),
    };

    TestApp {
        router: billing_router(state),
        subscriptions,
        charges,
        gateway,
    }
}

fn ymd(y: i32, m: u32, d: u32) -> Timestamp {
    Timestamp::from_ymd(y, m, d).unwrap()
}

fn client_record(status: SubscriptionStatus) -> SubscriptionRecord {
    SubscriptionRecord {
        customer_id: Some(CustomerId::new()),
        plan_id: Some(PlanId::new()),
        core: SubscriptionCore {
            id: SubscriptionId::new(),
            owner_id: UserId::new(MERCHANT).unwrap(),
            status,
            plan_label: "Gold".to_string(),
            amount_cents: 9900,
            billing_term: BillingTerm::Monthly,
            start_date: ymd(2024, 1, 1),
            last_billing_date: Some(ymd(2024, 1, 1)),
            next_billing_date: Some(ymd(2024, 2, 1)),
            failed_payments_count: 0,
            created_at: ymd(2024, 1, 1),
            updated_at: ymd(2024, 1, 1),
            cancelled_at: None,
        },
    }
}

fn api_post(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn mercadopago_notification(payment_id: &str, signature: &str) -> Request<Body> {
    let body = json!({"action": "payment.updated", "type": "payment", "data": {"id": payment_id}});
    Request::builder()
        .method("POST")
        .uri(format!("/webhooks/mercadopago?data.id={}&type=payment", payment_id))
        .header("content-type", "application/json")
        .header("x-signature", signature)
        .header("x-request-id", "req-http-1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sign(data_id: &str, request_id: &str, ts: i64) -> String {
    let manifest = build_manifest(Some(data_id), Some(request_id), &ts.to_string());
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(manifest.as_bytes());
    format!("ts={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn health_returns_ok() {
    let app = test_app();

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

// =============================================================================
// Owner-scoped API
// =============================================================================

#[tokio::test]
async fn api_requires_user_header() {
    let app = test_app();
    let id = SubscriptionId::new();

    let response = app
        .router
        .oneshot(api_post(&format!("/api/subscriptions/{}/cancel", id), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error_code"], "AUTHENTICATION_REQUIRED");
}

#[tokio::test]
async fn cancel_returns_no_content() {
    let app = test_app();
    let record = client_record(SubscriptionStatus::Active);
    app.subscriptions.insert(&record).await.unwrap();

    let response = app
        .router
        .oneshot(api_post(
            &format!("/api/subscriptions/{}/cancel", record.core.id),
            Some(MERCHANT),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let stored = app.subscriptions.find_by_id(&record.core.id).await.unwrap().unwrap();
    assert_eq!(stored.core.status, SubscriptionStatus::Cancelled);
}

#[tokio::test]
async fn cancel_of_foreign_subscription_is_not_found() {
    let app = test_app();
    let record = client_record(SubscriptionStatus::Active);
    app.subscriptions.insert(&record).await.unwrap();

    let response = app
        .router
        .oneshot(api_post(
            &format!("/api/subscriptions/{}/cancel", record.core.id),
            Some("someone-else"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_subscription_id_is_bad_request() {
    let app = test_app();

    let response = app
        .router
        .oneshot(api_post("/api/subscriptions/not-a-uuid/cancel", Some(MERCHANT)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reactivate_returns_checkout_url() {
    let app = test_app();
    let mut record = client_record(SubscriptionStatus::Cancelled);
    record.core.next_billing_date = None;
    app.subscriptions.insert(&record).await.unwrap();

    let response = app
        .router
        .oneshot(api_post(
            &format!("/api/subscriptions/{}/reactivate", record.core.id),
            Some(MERCHANT),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["preference_id"], "pref_mock_1");
    assert!(body["payment_url"].as_str().unwrap().contains("pref_mock_1"));
}

#[tokio::test]
async fn reactivate_active_subscription_conflicts() {
    let app = test_app();
    let record = client_record(SubscriptionStatus::Active);
    app.subscriptions.insert(&record).await.unwrap();

    let response = app
        .router
        .oneshot(api_post(
            &format!("/api/subscriptions/{}/reactivate", record.core.id),
            Some(MERCHANT),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(app.gateway.call_count("create_checkout_preference"), 0);
}

#[tokio::test]
async fn check_pending_reports_callers_charges() {
    let app = test_app();
    let metadata = json!({"type": "platform_subscription", "user_id": MERCHANT, "months": 1});
    app.charges
        .record_paid(
            ProviderCharge {
                owner_id: UserId::new(MERCHANT).unwrap(),
                external_id: "pay-http-1".to_string(),
                amount_cents: 4990,
                payment_method: PaymentMethod::Pix,
                metadata,
                paid_at: ymd(2024, 1, 10),
            },
            ymd(2024, 1, 10),
        )
        .await
        .unwrap();

    let response = app
        .router
        .oneshot(api_post("/api/payments/check-pending", Some(MERCHANT)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["processed"], 1);
    assert_eq!(body["total_paid"], 1);
    assert_eq!(body["total_eligible"], 1);
}

// =============================================================================
// Webhooks
// =============================================================================

#[tokio::test]
async fn signed_payment_notification_is_settled() {
    let app = test_app();
    app.gateway.add_payment(ProviderPayment {
        id: "7001".to_string(),
        status: ProviderPaymentStatus::Approved,
        amount_cents: 4990,
        payment_method: PaymentMethod::CreditCard,
        date_created: Some(ymd(2024, 1, 10)),
        date_approved: Some(ymd(2024, 1, 10)),
        date_of_expiration: None,
        metadata: json!({"type": "platform_subscription", "user_id": MERCHANT, "months": 1}),
        external_reference: None,
    });

    let response = app
        .router
        .oneshot(mercadopago_notification("7001", &sign("7001", "req-http-1", 1_704_844_800)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["received"], true);
    assert_eq!(body["result"], "settled");
    assert_eq!(app.subscriptions.count().await, 1);
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let app = test_app();

    let response = app
        .router
        .oneshot(mercadopago_notification("7002", "ts=1704844800,v1=deadbeef"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error_code"], "INVALID_SIGNATURE");
    assert_eq!(app.gateway.call_count("get_payment"), 0);
}

#[tokio::test]
async fn pix_notification_requires_token() {
    let app = test_app();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/pix")
                .header("x-webhook-token", "wrong")
                .body(Body::from(json!({"pix": []}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pix_notification_settles_pending_charge() {
    let app = test_app();
    let charge = Charge::pending(
        UserId::new(MERCHANT).unwrap(),
        "txid-http-1",
        4990,
        PaymentMethod::Pix,
        json!({"type": "platform_subscription", "user_id": MERCHANT, "months": 1}),
        ymd(2024, 1, 10),
    );
    app.charges.insert(&charge).await.unwrap();

    let body = json!({"pix": [
        {"txid": "txid-http-1", "endToEndId": "E123", "valor": "49.90", "horario": "2024-01-10T12:00:00Z"},
        {"txid": "txid-unknown", "valor": "10.00"}
    ]});
    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/pix")
                .header("content-type", "application/json")
                .header("x-webhook-token", PIX_TOKEN)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["settled"], 1);
    assert_eq!(body["ignored"], 1);

    let stored = app.charges.find_by_external_id("txid-http-1").await.unwrap().unwrap();
    assert_eq!(stored.processed_for.as_deref(), Some("pix_webhook"));
    assert!(stored.applied_at.is_some());
}
