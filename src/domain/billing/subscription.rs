//! Subscription entity.
//!
//! Storage holds one flat [`SubscriptionRecord`] per row. Processing code works
//! on the narrowed [`Subscription`] union, which can only be built through the
//! integrity validator.
//!
//! # Invariants
//!
//! - `owner_id` is always present
//! - Platform rows carry neither `customer_id` nor `plan_id`; client rows carry both
//! - Status changes go through [`StateMachine`]
//! - A cancelled subscription has no `next_billing_date`

use serde::Serialize;

use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, PlanId, StateMachine, SubscriptionId, Timestamp, UserId,
};

use super::{
    check_integrity, check_operation, BillingTerm, IntegrityError, PeriodAccumulation,
    SubscriptionKind, SubscriptionStatus,
};

/// Fields shared by both subscription scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionCore {
    pub id: SubscriptionId,

    /// Merchant account owning the row.
    pub owner_id: UserId,

    pub status: SubscriptionStatus,

    /// Display name of the plan or term last paid for.
    pub plan_label: String,

    /// Last billed amount in cents.
    pub amount_cents: i64,

    pub billing_term: BillingTerm,

    pub start_date: Timestamp,
    pub last_billing_date: Option<Timestamp>,
    pub next_billing_date: Option<Timestamp>,
    pub failed_payments_count: i32,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub cancelled_at: Option<Timestamp>,
}

impl SubscriptionCore {
    /// Applies an approved payment: active, cursor advanced, failures reset.
    pub fn apply_payment(
        &mut self,
        payment_date: Timestamp,
        period: &PeriodAccumulation,
        term: BillingTerm,
        amount_cents: i64,
        plan_label: Option<&str>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::Active)?;
        self.last_billing_date = Some(payment_date);
        self.next_billing_date = Some(period.next_billing_date);
        self.failed_payments_count = 0;
        self.billing_term = term;
        self.amount_cents = amount_cents;
        if let Some(label) = plan_label {
            self.plan_label = label.to_string();
        }
        self.cancelled_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Cancels the subscription.
    ///
    /// Returns `false` without touching anything when it is already cancelled.
    pub fn cancel(&mut self, now: Timestamp) -> Result<bool, DomainError> {
        if self.status == SubscriptionStatus::Cancelled {
            return Ok(false);
        }

        self.transition_to(SubscriptionStatus::Cancelled)?;
        self.next_billing_date = None;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(true)
    }

    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|e| {
            DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
                .with_detail("subscription_id", self.id.to_string())
        })?;
        Ok(())
    }
}

/// Row shape as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRecord {
    pub customer_id: Option<CustomerId>,
    pub plan_id: Option<PlanId>,
    pub core: SubscriptionCore,
}

impl SubscriptionRecord {
    /// Validates and narrows the record.
    pub fn narrow(self) -> Result<Subscription, IntegrityError> {
        Subscription::try_from(self)
    }

    /// Narrows, additionally requiring `expected` for `operation`.
    pub fn narrow_for(
        self,
        operation: &str,
        expected: Option<SubscriptionKind>,
    ) -> Result<Subscription, IntegrityError> {
        check_operation(&self, operation, expected)?;
        Subscription::try_from(self)
    }
}

/// The operator billing a merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformSubscription {
    pub core: SubscriptionCore,
}

impl PlatformSubscription {
    /// A new active platform subscription starting at `payment_date`.
    pub fn start(
        owner_id: UserId,
        term: BillingTerm,
        amount_cents: i64,
        plan_label: impl Into<String>,
        payment_date: Timestamp,
        now: Timestamp,
    ) -> Self {
        Self {
            core: SubscriptionCore {
                id: SubscriptionId::new(),
                owner_id,
                status: SubscriptionStatus::Active,
                plan_label: plan_label.into(),
                amount_cents,
                billing_term: term,
                start_date: payment_date,
                last_billing_date: Some(payment_date),
                next_billing_date: Some(payment_date.add_months(term.months())),
                failed_payments_count: 0,
                created_at: now,
                updated_at: now,
                cancelled_at: None,
            },
        }
    }
}

/// A merchant's customer on one of the merchant's plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSubscription {
    pub customer_id: CustomerId,
    pub plan_id: PlanId,
    pub core: SubscriptionCore,
}

/// A subscription that passed the integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subscription {
    Platform(PlatformSubscription),
    Client(ClientSubscription),
}

impl Subscription {
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            Subscription::Platform(_) => SubscriptionKind::Platform,
            Subscription::Client(_) => SubscriptionKind::Client,
        }
    }

    pub fn core(&self) -> &SubscriptionCore {
        match self {
            Subscription::Platform(s) => &s.core,
            Subscription::Client(s) => &s.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut SubscriptionCore {
        match self {
            Subscription::Platform(s) => &mut s.core,
            Subscription::Client(s) => &mut s.core,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.core().id
    }

    /// Flattens back to the stored row shape.
    pub fn into_record(self) -> SubscriptionRecord {
        match self {
            Subscription::Platform(s) => SubscriptionRecord {
                customer_id: None,
                plan_id: None,
                core: s.core,
            },
            Subscription::Client(s) => SubscriptionRecord {
                customer_id: Some(s.customer_id),
                plan_id: Some(s.plan_id),
                core: s.core,
            },
        }
    }
}

impl TryFrom<SubscriptionRecord> for Subscription {
    type Error = IntegrityError;

    fn try_from(record: SubscriptionRecord) -> Result<Self, Self::Error> {
        check_integrity(&record)?;
        match (record.customer_id, record.plan_id) {
            (Some(customer_id), Some(plan_id)) => Ok(Subscription::Client(ClientSubscription {
                customer_id,
                plan_id,
                core: record.core,
            })),
            _ => Ok(Subscription::Platform(PlatformSubscription { core: record.core })),
        }
    }
}

impl From<PlatformSubscription> for Subscription {
    fn from(s: PlatformSubscription) -> Self {
        Subscription::Platform(s)
    }
}

impl From<ClientSubscription> for Subscription {
    fn from(s: ClientSubscription) -> Self {
        Subscription::Client(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::accumulate;
    use crate::domain::billing::test_support::{client_record, platform_record, ymd};

    #[test]
    fn try_from_narrows_platform_and_client() {
        assert!(matches!(
            Subscription::try_from(platform_record()),
            Ok(Subscription::Platform(_))
        ));
        assert!(matches!(
            Subscription::try_from(client_record()),
            Ok(Subscription::Client(_))
        ));
    }

    #[test]
    fn try_from_rejects_mixed_scope() {
        let mut record = client_record();
        record.customer_id = None;
        assert!(Subscription::try_from(record).is_err());
    }

    #[test]
    fn into_record_round_trips_client_fields() {
        let record = client_record();
        let narrowed = Subscription::try_from(record.clone()).unwrap();
        assert_eq!(narrowed.into_record(), record);
    }

    #[test]
    fn narrow_for_rejects_wrong_kind() {
        let result = platform_record().narrow_for("reactivate", Some(SubscriptionKind::Client));
        assert!(matches!(result, Err(IntegrityError::KindMismatch { .. })));
    }

    #[test]
    fn start_sets_period_from_payment_date() {
        let paid = ymd(2024, 1, 31);
        let sub = PlatformSubscription::start(
            UserId::new("merchant-1").unwrap(),
            BillingTerm::Monthly,
            4990,
            "Pro mensal",
            paid,
            paid,
        );

        assert_eq!(sub.core.status, SubscriptionStatus::Active);
        assert_eq!(sub.core.start_date, paid);
        assert_eq!(sub.core.next_billing_date, Some(ymd(2024, 2, 29)));
        assert_eq!(sub.core.failed_payments_count, 0);
    }

    #[test]
    fn apply_payment_reactivates_and_resets_failures() {
        let mut record = client_record();
        record.core.status = SubscriptionStatus::Cancelled;
        record.core.failed_payments_count = 3;
        record.core.next_billing_date = None;
        record.core.cancelled_at = Some(ymd(2024, 1, 1));

        let paid = ymd(2024, 2, 1);
        let period = accumulate(paid, BillingTerm::Monthly, None, paid);
        record
            .core
            .apply_payment(paid, &period, BillingTerm::Monthly, 9900, None, paid)
            .unwrap();

        assert_eq!(record.core.status, SubscriptionStatus::Active);
        assert_eq!(record.core.failed_payments_count, 0);
        assert_eq!(record.core.last_billing_date, Some(paid));
        assert_eq!(record.core.next_billing_date, Some(ymd(2024, 3, 1)));
        assert_eq!(record.core.cancelled_at, None);
        assert_eq!(record.core.amount_cents, 9900);
    }

    #[test]
    fn cancel_clears_next_billing_date() {
        let mut record = platform_record();
        let now = ymd(2024, 2, 10);

        assert!(record.core.cancel(now).unwrap());
        assert_eq!(record.core.status, SubscriptionStatus::Cancelled);
        assert_eq!(record.core.next_billing_date, None);
        assert_eq!(record.core.cancelled_at, Some(now));
    }

    #[test]
    fn cancel_twice_is_a_no_op() {
        let mut record = platform_record();
        let first = ymd(2024, 2, 10);
        record.core.cancel(first).unwrap();

        assert!(!record.core.cancel(ymd(2024, 3, 10)).unwrap());
        assert_eq!(record.core.cancelled_at, Some(first));
    }
}
