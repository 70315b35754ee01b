//! PaymentEventProcessor - applies an approved payment to a subscription.
//!
//! Platform payments renew (or create) the merchant's own subscription.
//! Client payments renew or reactivate a merchant's customer subscription and
//! record the revenue in the merchant's ledger.
//!
//! The caller must hold the charge claim before calling in here.

use std::sync::Arc;

use crate::domain::billing::{
    accumulate, BillingError, BillingTerm, NewLedgerEntry, PaymentMethod, PeriodAccumulation,
    PlatformSubscription, Subscription, SubscriptionCore, SubscriptionKind, SubscriptionStatus,
};
use crate::domain::foundation::{LedgerEntryId, SubscriptionId, Timestamp, UserId};
use crate::ports::{LedgerRepository, SubscriptionRepository};

/// Command to apply a merchant's payment to their platform subscription.
#[derive(Debug, Clone)]
pub struct ApplyPlatformPaymentCommand {
    pub user_id: UserId,
    /// Raw month count from metadata; normalized to a supported term.
    pub term_months: i64,
    pub amount_cents: i64,
    pub plan_label: String,
    pub payment_date: Timestamp,
    pub now: Timestamp,
}

/// Command to apply a customer's payment to a client subscription.
#[derive(Debug, Clone)]
pub struct ApplyClientPaymentCommand {
    pub owner_id: UserId,
    pub subscription_id: SubscriptionId,
    /// Falls back to the subscription's stored term.
    pub term: Option<BillingTerm>,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub payment_date: Timestamp,
    pub now: Timestamp,
}

/// Result of applying a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentApplied {
    pub subscription_id: SubscriptionId,
    pub kind: SubscriptionKind,
    pub next_billing_date: Timestamp,
    pub accumulated_days: i64,
    /// A platform subscription was created rather than renewed.
    pub created: bool,
    /// The subscription was not active before this payment.
    pub reactivated: bool,
    /// Ledger entry written (client payments only).
    pub ledger_entry_id: Option<LedgerEntryId>,
}

/// Applies approved payments to subscriptions.
pub struct PaymentEventProcessor {
    subscriptions: Arc<dyn SubscriptionRepository>,
    ledger: Arc<dyn LedgerRepository>,
}

impl PaymentEventProcessor {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        ledger: Arc<dyn LedgerRepository>,
    ) -> Self {
        Self {
            subscriptions,
            ledger,
        }
    }

    /// Renews the newest platform subscription of the user, or creates one.
    ///
    /// Never writes a ledger entry.
    pub async fn apply_approved_payment(
        &self,
        cmd: ApplyPlatformPaymentCommand,
    ) -> Result<PaymentApplied, BillingError> {
        let term = BillingTerm::normalize(cmd.term_months);

        let Some(record) = self.subscriptions.find_latest_platform(&cmd.user_id).await? else {
            let created = PlatformSubscription::start(
                cmd.user_id.clone(),
                term,
                cmd.amount_cents,
                cmd.plan_label,
                cmd.payment_date,
                cmd.now,
            );
            let subscription = Subscription::from(created);
            let subscription_id = subscription.id();
            let next_billing_date = subscription
                .core()
                .next_billing_date
                .unwrap_or_else(|| cmd.payment_date.add_months(term.months()));

            self.subscriptions.insert(&subscription.into_record()).await?;

            tracing::info!(
                user_id = %cmd.user_id,
                %subscription_id,
                term = %term,
                next_billing_date = %next_billing_date,
                "Platform subscription created from payment"
            );

            return Ok(PaymentApplied {
                subscription_id,
                kind: SubscriptionKind::Platform,
                next_billing_date,
                accumulated_days: 0,
                created: true,
                reactivated: false,
                ledger_entry_id: None,
            });
        };

        let mut subscription =
            record.narrow_for("apply_approved_payment", Some(SubscriptionKind::Platform))?;
        let core = subscription.core_mut();
        let reactivated = core.status != SubscriptionStatus::Active;

        let period = accumulate(cmd.payment_date, term, core.next_billing_date, cmd.payment_date);
        apply(
            core,
            cmd.payment_date,
            &period,
            term,
            cmd.amount_cents,
            Some(&cmd.plan_label),
            cmd.now,
        )?;

        let subscription_id = subscription.id();
        self.subscriptions.update(&subscription.into_record()).await?;

        tracing::info!(
            user_id = %cmd.user_id,
            %subscription_id,
            term = %term,
            accumulated_days = period.accumulated_days,
            capped = period.capped,
            next_billing_date = %period.next_billing_date,
            "Platform subscription renewed"
        );

        Ok(PaymentApplied {
            subscription_id,
            kind: SubscriptionKind::Platform,
            next_billing_date: period.next_billing_date,
            accumulated_days: period.accumulated_days,
            created: false,
            reactivated,
            ledger_entry_id: None,
        })
    }

    /// Renews or reactivates a client subscription and records the revenue.
    pub async fn apply_client_payment(
        &self,
        cmd: ApplyClientPaymentCommand,
    ) -> Result<PaymentApplied, BillingError> {
        let record = self
            .subscriptions
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(cmd.subscription_id))?;

        if record.core.owner_id != cmd.owner_id {
            tracing::warn!(
                subscription_id = %cmd.subscription_id,
                payment_owner = %cmd.owner_id,
                "Client payment owner does not match subscription owner"
            );
            return Err(BillingError::OwnerMismatch {
                subscription_id: cmd.subscription_id,
            });
        }

        let mut subscription =
            record.narrow_for("apply_client_payment", Some(SubscriptionKind::Client))?;
        let core = subscription.core_mut();
        let term = cmd.term.unwrap_or(core.billing_term);
        let reactivated = core.status != SubscriptionStatus::Active;
        let plan_label = core.plan_label.clone();

        let period = accumulate(cmd.payment_date, term, core.next_billing_date, cmd.payment_date);
        apply(core, cmd.payment_date, &period, term, cmd.amount_cents, None, cmd.now)?;

        self.subscriptions.update(&subscription.into_record()).await?;

        let entry = NewLedgerEntry::subscription_payment(
            cmd.owner_id.clone(),
            cmd.subscription_id,
            cmd.amount_cents,
            &plan_label,
            cmd.payment_method,
            cmd.payment_date,
        );

        let ledger_entry_id = if self.ledger.exists_duplicate(&entry).await? {
            tracing::info!(
                subscription_id = %cmd.subscription_id,
                "Identical ledger entry already recorded, skipping"
            );
            None
        } else {
            Some(self.ledger.insert(entry).await?.id)
        };

        tracing::info!(
            subscription_id = %cmd.subscription_id,
            owner_id = %cmd.owner_id,
            reactivated,
            accumulated_days = period.accumulated_days,
            next_billing_date = %period.next_billing_date,
            "Client subscription payment applied"
        );

        Ok(PaymentApplied {
            subscription_id: cmd.subscription_id,
            kind: SubscriptionKind::Client,
            next_billing_date: period.next_billing_date,
            accumulated_days: period.accumulated_days,
            created: false,
            reactivated,
            ledger_entry_id,
        })
    }
}

fn apply(
    core: &mut SubscriptionCore,
    payment_date: Timestamp,
    period: &PeriodAccumulation,
    term: BillingTerm,
    amount_cents: i64,
    plan_label: Option<&str>,
    now: Timestamp,
) -> Result<(), BillingError> {
    let current = core.status;
    core.apply_payment(payment_date, period, term, amount_cents, plan_label, now)
        .map_err(|_| BillingError::invalid_state(current.as_str(), "apply a payment to"))
}
