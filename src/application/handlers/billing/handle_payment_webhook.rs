//! HandlePaymentWebhookHandler - Mercado Pago notification ingress.
//!
//! Notifications only carry a resource id. The handler verifies the signature,
//! dispatches on the envelope shape, fetches the current resource from the
//! provider and settles it as a paid charge.
//!
//! Every validly signed and parsed notification is acknowledged unless
//! processing failed after parsing; those failures return a retryable error so
//! the provider redelivers.

use std::sync::Arc;

use crate::domain::billing::{
    authorized_payment_charge_key, preapproval_charge_key, Charge, Claimant, PaymentMethod,
    PaymentPurpose, ProviderCharge,
};
use crate::domain::foundation::{ChargeId, DomainError, SubscriptionId, Timestamp};
use crate::domain::webhook::{
    classify, signed_data_id, MercadoPagoSignatureVerifier, SignatureInput, WebhookEnvelope,
    WebhookError, WebhookEvent, WebhookQuery,
};
use crate::ports::{ChargeRepository, PaymentGateway, PreapprovalStatus, ProviderPreapproval};

use super::settle_charge::{ChargeSettler, SettlementOutcome};

/// Command to handle one provider notification.
#[derive(Debug, Clone, Default)]
pub struct HandlePaymentWebhookCommand {
    /// Raw request body.
    pub body: Vec<u8>,
    pub query: WebhookQuery,
    /// `x-signature` header.
    pub x_signature: Option<String>,
    /// `x-request-id` header.
    pub x_request_id: Option<String>,
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The notification's charge was settled by this delivery.
    Settled {
        charge_id: ChargeId,
        subscription_id: SubscriptionId,
    },
    /// The charge was already claimed (replay or concurrent sweeper).
    AlreadyProcessed { charge_id: ChargeId },
    /// Valid notification with nothing to do.
    Acknowledged { reason: String },
}

impl WebhookOutcome {
    fn acknowledged(reason: impl Into<String>) -> Self {
        WebhookOutcome::Acknowledged {
            reason: reason.into(),
        }
    }

    pub(crate) fn from_settlement(outcome: SettlementOutcome) -> Self {
        match outcome {
            SettlementOutcome::Applied {
                charge_id,
                subscription_id,
                ..
            } => WebhookOutcome::Settled {
                charge_id,
                subscription_id,
            },
            SettlementOutcome::AlreadyClaimed { charge_id } => {
                WebhookOutcome::AlreadyProcessed { charge_id }
            }
            SettlementOutcome::Skipped { reason, .. } => WebhookOutcome::Acknowledged { reason },
        }
    }
}

/// Handler for Mercado Pago notifications.
pub struct HandlePaymentWebhookHandler {
    verifier: MercadoPagoSignatureVerifier,
    gateway: Arc<dyn PaymentGateway>,
    charges: Arc<dyn ChargeRepository>,
    settler: Arc<ChargeSettler>,
}

impl HandlePaymentWebhookHandler {
    pub fn new(
        verifier: MercadoPagoSignatureVerifier,
        gateway: Arc<dyn PaymentGateway>,
        charges: Arc<dyn ChargeRepository>,
        settler: Arc<ChargeSettler>,
    ) -> Self {
        Self {
            verifier,
            gateway,
            charges,
            settler,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandlePaymentWebhookCommand,
    ) -> Result<WebhookOutcome, WebhookError> {
        let now = Timestamp::now();

        // 1. Parse and verify
        let envelope = WebhookEnvelope::parse(&cmd.body)?;
        let data_id = signed_data_id(&envelope, &cmd.query);

        self.verifier.verify(
            SignatureInput {
                x_signature: cmd.x_signature.as_deref(),
                x_request_id: cmd.x_request_id.as_deref(),
                data_id: data_id.as_deref(),
            },
            now,
        )?;

        // 2. Dispatch on shape
        let event = classify(&envelope, &cmd.query)?;
        tracing::debug!(?event, "Webhook classified");

        match event {
            WebhookEvent::Preapproval { id } => self.handle_preapproval(&id, now).await,
            WebhookEvent::AuthorizedPayment { id } => {
                self.handle_authorized_payment(&id, now).await
            }
            WebhookEvent::Payment { id } => self.handle_payment(&id, now).await,
            WebhookEvent::Unmatched { event_type, action } => {
                tracing::info!(?event_type, ?action, "Webhook shape not handled, acknowledging");
                Ok(WebhookOutcome::acknowledged("unhandled notification"))
            }
        }
    }

    async fn handle_payment(
        &self,
        payment_id: &str,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let payment = self.gateway.get_payment(payment_id).await?;

        if !payment.status.is_approved() {
            tracing::info!(payment_id, status = ?payment.status, "Payment not approved yet");
            return Ok(WebhookOutcome::acknowledged("payment not approved"));
        }

        let purpose = PaymentPurpose::from_metadata(&payment.metadata);
        let Some(owner_id) = purpose.owner().cloned() else {
            return Ok(Self::acknowledge_purpose(payment_id, &purpose));
        };

        let charge = self
            .record_paid(
                ProviderCharge {
                    owner_id,
                    external_id: payment.id.clone(),
                    amount_cents: payment.amount_cents,
                    payment_method: payment.payment_method,
                    paid_at: payment.payment_date(now),
                    metadata: payment.metadata,
                },
                now,
            )
            .await?;

        self.settle(&charge, Claimant::PaymentWebhook, now).await
    }

    async fn handle_preapproval(
        &self,
        preapproval_id: &str,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let preapproval = self.gateway.get_preapproval(preapproval_id).await?;

        match preapproval.status {
            PreapprovalStatus::Authorized => {}
            PreapprovalStatus::Pending => {
                tracing::info!(preapproval_id, "Preapproval pending, waiting for authorization");
                return Ok(WebhookOutcome::acknowledged("preapproval pending"));
            }
            other => {
                tracing::info!(preapproval_id, status = ?other, "Preapproval not authorized");
                return Ok(WebhookOutcome::acknowledged("preapproval not authorized"));
            }
        }

        let Some(charge) = self
            .record_mandate_charge(
                &preapproval,
                preapproval_charge_key(&preapproval.id),
                preapproval.amount_cents,
                preapproval.date_created,
                now,
            )
            .await?
        else {
            return Ok(WebhookOutcome::acknowledged("preapproval metadata not recognised"));
        };

        self.settle(&charge, Claimant::PreapprovalWebhook, now).await
    }

    /// Renewal variant: one debit of an authorized mandate.
    async fn handle_authorized_payment(
        &self,
        authorized_payment_id: &str,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let authorized = self.gateway.get_authorized_payment(authorized_payment_id).await?;

        if !authorized.payment_status.is_approved() {
            tracing::info!(
                authorized_payment_id,
                status = ?authorized.payment_status,
                "Authorized payment not approved"
            );
            return Ok(WebhookOutcome::acknowledged("authorized payment not approved"));
        }

        let preapproval = self.gateway.get_preapproval(&authorized.preapproval_id).await?;
        let amount_cents = if authorized.amount_cents > 0 {
            authorized.amount_cents
        } else {
            preapproval.amount_cents
        };

        let Some(charge) = self
            .record_mandate_charge(
                &preapproval,
                authorized_payment_charge_key(&authorized.id),
                amount_cents,
                authorized.payment_date(now),
                now,
            )
            .await?
        else {
            return Ok(WebhookOutcome::acknowledged("preapproval metadata not recognised"));
        };

        self.settle(&charge, Claimant::AuthorizedPaymentWebhook, now).await
    }

    /// Records a card-mandate charge, or `None` when the mandate's metadata
    /// does not describe a subscription.
    async fn record_mandate_charge(
        &self,
        preapproval: &ProviderPreapproval,
        external_id: String,
        amount_cents: i64,
        paid_at: Timestamp,
        now: Timestamp,
    ) -> Result<Option<Charge>, WebhookError> {
        let purpose = PaymentPurpose::from_metadata(&preapproval.metadata);
        let Some(owner_id) = purpose.owner().cloned() else {
            Self::acknowledge_purpose(&preapproval.id, &purpose);
            return Ok(None);
        };

        let charge = self
            .record_paid(
                ProviderCharge {
                    owner_id,
                    external_id,
                    amount_cents,
                    payment_method: PaymentMethod::CreditCard,
                    metadata: preapproval.metadata.clone(),
                    paid_at,
                },
                now,
            )
            .await?;

        Ok(Some(charge))
    }

    async fn record_paid(
        &self,
        charge: ProviderCharge,
        now: Timestamp,
    ) -> Result<Charge, WebhookError> {
        self.charges
            .record_paid(charge, now)
            .await
            .map_err(storage_error)
    }

    async fn settle(
        &self,
        charge: &Charge,
        claimant: Claimant,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let outcome = self.settler.settle(charge, claimant, now).await?;
        Ok(WebhookOutcome::from_settlement(outcome))
    }

    fn acknowledge_purpose(resource_id: &str, purpose: &PaymentPurpose) -> WebhookOutcome {
        match purpose {
            PaymentPurpose::Order { order_id, .. } => {
                tracing::info!(resource_id, %order_id, "Order payment acknowledged");
                WebhookOutcome::acknowledged("order payment")
            }
            _ => {
                tracing::warn!(resource_id, "Payment metadata not recognised, acknowledging");
                WebhookOutcome::acknowledged("metadata not recognised")
            }
        }
    }
}

fn storage_error(e: DomainError) -> WebhookError {
    WebhookError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryChargeRepository, InMemoryLedgerRepository, InMemorySubscriptionRepository,
    };
    use crate::adapters::mercadopago::MockPaymentGateway;
    use crate::application::handlers::billing::PaymentEventProcessor;
    use crate::domain::billing::test_support::ymd;
    use crate::domain::billing::{BillingTerm, SubscriptionStatus};
    use crate::domain::foundation::UserId;
    use crate::domain::webhook::compute_test_signature;
    use crate::ports::{
        PaymentError, ProviderAuthorizedPayment, ProviderPayment, ProviderPaymentStatus,
    };
    use crate::ports::SubscriptionRepository;
    use secrecy::SecretString;
    use serde_json::{json, Value};

    const SECRET: &str = "whsec_test";

    struct Fixture {
        gateway: MockPaymentGateway,
        charges: InMemoryChargeRepository,
        subscriptions: InMemorySubscriptionRepository,
        handler: HandlePaymentWebhookHandler,
    }

    fn fixture_with(secret: Option<&str>) -> Fixture {
        let gateway = MockPaymentGateway::new();
        let charges = InMemoryChargeRepository::new();
        let subscriptions = InMemorySubscriptionRepository::new();
        let processor = PaymentEventProcessor::new(
            Arc::new(subscriptions.clone()),
            Arc::new(InMemoryLedgerRepository::new()),
        );
        let settler = Arc::new(ChargeSettler::new(Arc::new(charges.clone()), processor));
        let verifier =
            MercadoPagoSignatureVerifier::new(secret.map(|s| SecretString::new(s.to_string())));

        Fixture {
            handler: HandlePaymentWebhookHandler::new(
                verifier,
                Arc::new(gateway.clone()),
                Arc::new(charges.clone()),
                settler,
            ),
            gateway,
            charges,
            subscriptions,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Some(SECRET))
    }

    fn signed(body: Value, data_id: &str) -> HandlePaymentWebhookCommand {
        let request_id = "req-1";
        HandlePaymentWebhookCommand {
            body: serde_json::to_vec(&body).unwrap(),
            query: WebhookQuery {
                data_id: Some(data_id.to_string()),
                ..Default::default()
            },
            x_signature: Some(compute_test_signature(
                SECRET,
                Some(data_id),
                Some(request_id),
                1_704_067_200,
            )),
            x_request_id: Some(request_id.to_string()),
        }
    }

    fn preapproval_notice(id: &str) -> HandlePaymentWebhookCommand {
        signed(json!({"type": "subscription_preapproval", "data": {"id": id}}), id)
    }

    fn platform_metadata() -> Value {
        json!({"type": "platform_subscription", "user_id": "merchant-1", "months": 6, "plan_name": "Pro"})
    }

    fn approved_payment(id: &str, metadata: Value) -> ProviderPayment {
        ProviderPayment {
            id: id.to_string(),
            status: ProviderPaymentStatus::Approved,
            amount_cents: 26940,
            payment_method: PaymentMethod::CreditCard,
            date_created: Some(ymd(2024, 1, 10)),
            date_approved: Some(ymd(2024, 1, 10)),
            date_of_expiration: None,
            metadata,
            external_reference: None,
        }
    }

    fn preapproval(id: &str, status: PreapprovalStatus) -> ProviderPreapproval {
        ProviderPreapproval {
            id: id.to_string(),
            status,
            reason: Some("Pro".to_string()),
            amount_cents: 4990,
            date_created: ymd(2024, 2, 1),
            metadata: json!({"type": "platform_subscription", "userId": "merchant-1", "months": 1}),
            external_reference: None,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Verification and Shape
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn bad_signature_is_rejected_before_any_fetch() {
        let f = fixture();
        let mut cmd = signed(json!({"action": "payment.updated", "data": {"id": "1"}}), "1");
        cmd.x_signature = Some("ts=1704067200,v1=00ff".to_string());

        let err = f.handler.handle(cmd).await.unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert_eq!(err.status_code(), http::StatusCode::UNAUTHORIZED);
        assert_eq!(f.gateway.call_count("get_payment"), 0);
    }

    #[tokio::test]
    async fn missing_secret_skips_verification() {
        let f = fixture_with(None);
        let cmd = HandlePaymentWebhookCommand {
            body: br#"{"type":"test"}"#.to_vec(),
            ..Default::default()
        };

        let outcome = f.handler.handle(cmd).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Acknowledged { .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let f = fixture_with(None);
        let cmd = HandlePaymentWebhookCommand {
            body: b"{not json".to_vec(),
            ..Default::default()
        };

        let err = f.handler.handle(cmd).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Payment Notifications
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn approved_platform_payment_creates_subscription() {
        let f = fixture();
        f.gateway.add_payment(approved_payment("123", platform_metadata()));

        let outcome = f
            .handler
            .handle(signed(json!({"action": "payment.updated", "data": {"id": "123"}}), "123"))
            .await
            .unwrap();

        let WebhookOutcome::Settled { subscription_id, .. } = outcome else {
            panic!("expected settlement, got {:?}", outcome);
        };
        let stored = f.subscriptions.find_by_id(&subscription_id).await.unwrap().unwrap();
        assert_eq!(stored.core.status, SubscriptionStatus::Active);
        assert_eq!(stored.core.billing_term, BillingTerm::Semiannual);
        assert_eq!(stored.core.next_billing_date, Some(ymd(2024, 7, 10)));
        assert_eq!(stored.core.plan_label, "Pro");
    }

    #[tokio::test]
    async fn replayed_payment_is_applied_once() {
        let f = fixture();
        f.gateway.add_payment(approved_payment("123", platform_metadata()));
        let body = json!({"action": "payment.updated", "data": {"id": "123"}});

        f.handler.handle(signed(body.clone(), "123")).await.unwrap();
        let replay = f.handler.handle(signed(body, "123")).await.unwrap();

        assert!(matches!(replay, WebhookOutcome::AlreadyProcessed { .. }));
        let all = f.subscriptions.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].core.next_billing_date, Some(ymd(2024, 7, 10)));
        assert_eq!(f.charges.count().await, 1);
    }

    #[tokio::test]
    async fn pending_payment_is_acknowledged() {
        let f = fixture();
        let mut payment = approved_payment("124", platform_metadata());
        payment.status = ProviderPaymentStatus::Pending;
        f.gateway.add_payment(payment);

        let outcome = f
            .handler
            .handle(signed(json!({"action": "payment.created", "data": {"id": "124"}}), "124"))
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Acknowledged { .. }));
        assert_eq!(f.charges.count().await, 0);
    }

    #[tokio::test]
    async fn order_payment_is_acknowledged_without_charge() {
        let f = fixture();
        f.gateway
            .add_payment(approved_payment("125", json!({"order_id": "o-9", "order_number": "9"})));

        let outcome = f
            .handler
            .handle(signed(json!({"action": "payment.updated", "data": {"id": "125"}}), "125"))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::acknowledged("order payment"));
        assert_eq!(f.subscriptions.count().await, 0);
    }

    #[tokio::test]
    async fn provider_failure_is_retryable() {
        let f = fixture();
        f.gateway.set_method_error("get_payment", PaymentError::network("timeout"));

        let err = f
            .handler
            .handle(signed(json!({"action": "payment.updated", "data": {"id": "126"}}), "126"))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_data_id_on_payment_shape_is_bad_request() {
        let f = fixture_with(None);
        let cmd = HandlePaymentWebhookCommand {
            body: br#"{"action":"payment.updated"}"#.to_vec(),
            ..Default::default()
        };

        let err = f.handler.handle(cmd).await.unwrap_err();
        assert!(matches!(err, WebhookError::MissingField("data.id")));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Preapproval Notifications
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn pending_preapproval_is_acknowledged() {
        let f = fixture();
        f.gateway.add_preapproval(preapproval("pre-1", PreapprovalStatus::Pending));

        let outcome = f
            .handler
            .handle(preapproval_notice("pre-1"))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::acknowledged("preapproval pending"));
        assert_eq!(f.subscriptions.count().await, 0);
    }

    #[tokio::test]
    async fn authorized_preapproval_starts_at_mandate_creation() {
        let f = fixture();
        f.gateway.add_preapproval(preapproval("pre-1", PreapprovalStatus::Authorized));

        let outcome = f
            .handler
            .handle(preapproval_notice("pre-1"))
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Settled { .. }));
        let charge = f.charges.find_by_external_id("preapproval:pre-1").await.unwrap().unwrap();
        assert_eq!(charge.processed_for.as_deref(), Some("preapproval_webhook"));

        let owner = UserId::new("merchant-1").unwrap();
        let sub = f.subscriptions.find_latest_platform(&owner).await.unwrap().unwrap();
        assert_eq!(sub.core.next_billing_date, Some(ymd(2024, 3, 1)));
    }

    #[tokio::test]
    async fn authorized_payment_renews_with_accumulation() {
        let f = fixture();
        f.gateway.add_preapproval(preapproval("pre-1", PreapprovalStatus::Authorized));
        f.handler
            .handle(preapproval_notice("pre-1"))
            .await
            .unwrap();

        // Debited five days before the current expiry
        f.gateway.add_authorized_payment(ProviderAuthorizedPayment {
            id: "ap-1".to_string(),
            preapproval_id: "pre-1".to_string(),
            amount_cents: 4990,
            payment_status: ProviderPaymentStatus::Approved,
            payment_id: Some("900".to_string()),
            date_created: Some(ymd(2024, 2, 25)),
            debit_date: Some(ymd(2024, 2, 25)),
        });

        let outcome = f
            .handler
            .handle(signed(
                json!({"type": "subscription_authorized_payment", "data": {"id": "ap-1"}}),
                "ap-1",
            ))
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Settled { .. }));
        let owner = UserId::new("merchant-1").unwrap();
        let sub = f.subscriptions.find_latest_platform(&owner).await.unwrap().unwrap();
        assert_eq!(sub.core.next_billing_date, Some(ymd(2024, 4, 1)));
        assert_eq!(f.subscriptions.count().await, 1);
    }

    #[tokio::test]
    async fn unapproved_authorized_payment_is_acknowledged() {
        let f = fixture();
        f.gateway.add_authorized_payment(ProviderAuthorizedPayment {
            id: "ap-2".to_string(),
            preapproval_id: "pre-1".to_string(),
            amount_cents: 4990,
            payment_status: ProviderPaymentStatus::Rejected,
            payment_id: None,
            date_created: None,
            debit_date: None,
        });

        let outcome = f
            .handler
            .handle(signed(
                json!({"type": "subscription_authorized_payment", "data": {"id": "ap-2"}}),
                "ap-2",
            ))
            .await
            .unwrap();

        assert!(matches!(outcome, WebhookOutcome::Acknowledged { .. }));
        assert_eq!(f.gateway.call_count("get_preapproval"), 0);
    }
}
