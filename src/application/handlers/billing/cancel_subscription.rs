//! CancelSubscriptionHandler - Command handler for cancelling subscriptions.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Subscription};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::ports::SubscriptionRepository;

/// Command to cancel a subscription owned by the caller.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    pub owner_id: UserId,
    pub now: Timestamp,
}

/// Result of a cancellation.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,
    /// The subscription was already cancelled; nothing was written.
    pub already_cancelled: bool,
}

/// Handler for cancelling subscriptions.
///
/// Works on both scopes. Cancellation is immediate: the billing cursor is
/// cleared and `cancelled_at` recorded.
pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl CancelSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        // 1. Load, owner-scoped
        let record = self
            .subscriptions
            .find_by_id_for_owner(&cmd.subscription_id, &cmd.owner_id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(cmd.subscription_id))?;

        // 2. Integrity check
        let mut subscription = record.narrow_for("cancel_subscription", None)?;

        // 3. Cancel (domain logic)
        let status = subscription.core().status;
        let changed = subscription
            .core_mut()
            .cancel(cmd.now)
            .map_err(|_| BillingError::invalid_state(status.as_str(), "cancel"))?;

        if !changed {
            tracing::info!(
                subscription_id = %cmd.subscription_id,
                "Subscription already cancelled"
            );
            return Ok(CancelSubscriptionResult {
                subscription,
                already_cancelled: true,
            });
        }

        // 4. Persist
        self.subscriptions
            .update(&subscription.clone().into_record())
            .await?;

        tracing::info!(
            subscription_id = %cmd.subscription_id,
            owner_id = %cmd.owner_id,
            kind = %subscription.kind(),
            "Subscription cancelled"
        );

        Ok(CancelSubscriptionResult {
            subscription,
            already_cancelled: false,
        })
    }
}
