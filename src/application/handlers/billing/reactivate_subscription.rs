//! ReactivateSubscriptionHandler - starts a reactivation checkout.
//!
//! Reactivation is a payment: this handler only creates the checkout. The
//! subscription becomes active when the approved payment is settled.

use std::sync::Arc;

use serde_json::json;

use crate::domain::billing::{BillingError, Subscription, SubscriptionKind};
use crate::domain::foundation::{SubscriptionId, UserId, ValidationError};
use crate::ports::{CheckoutPreferenceRequest, PaymentGateway, SubscriptionRepository};

/// Command to start reactivating a client subscription.
#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub owner_id: UserId,
}

/// Checkout the customer must complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactivateSubscriptionResult {
    pub subscription_id: SubscriptionId,
    pub payment_url: String,
    pub preference_id: String,
}

pub struct ReactivateSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl ReactivateSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<ReactivateSubscriptionResult, BillingError> {
        let record = self
            .subscriptions
            .find_by_id_for_owner(&cmd.subscription_id, &cmd.owner_id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(cmd.subscription_id))?;

        // Platform rows and corrupt rows stop here
        let Subscription::Client(subscription) =
            record.narrow_for("reactivate_subscription", Some(SubscriptionKind::Client))?
        else {
            return Err(BillingError::invalid_state("platform", "reactivate"));
        };

        let core = &subscription.core;
        if !core.status.is_reactivatable() {
            return Err(BillingError::invalid_state(core.status.as_str(), "reactivate"));
        }
        if core.amount_cents <= 0 {
            return Err(ValidationError::invalid_format(
                "amount_cents",
                format!("subscription {} has no billable amount", core.id),
            )
            .into());
        }

        let request = CheckoutPreferenceRequest {
            title: format!("Reativação - {}", core.plan_label),
            amount_cents: core.amount_cents,
            external_reference: core.id.to_string(),
            metadata: json!({
                "type": "subscription_reactivation",
                "subscription_id": core.id.to_string(),
                "customer_id": subscription.customer_id.to_string(),
                "user_id": core.owner_id.as_str(),
                "months": core.billing_term.months(),
            }),
        };

        let preference = self.gateway.create_checkout_preference(request).await?;

        tracing::info!(
            subscription_id = %core.id,
            owner_id = %core.owner_id,
            preference_id = %preference.id,
            status = core.status.as_str(),
            "Reactivation checkout created"
        );

        Ok(ReactivateSubscriptionResult {
            subscription_id: core.id,
            payment_url: preference.init_point,
            preference_id: preference.id,
        })
    }
}
