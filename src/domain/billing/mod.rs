//! Billing domain module.
//!
//! Subscription lifecycle, charges, and the pure rules applied when a payment
//! is approved.
//!
//! # Module Structure
//!
//! - `accumulator` - Period accumulation with guard-rails
//! - `billing_term` - Normalized recurrence length
//! - `charge` - Provider transactions and the claim tags
//! - `integrity` - Platform/client discriminator validation
//! - `ledger` - Merchant-facing revenue entries
//! - `payment_purpose` - Metadata decoding
//! - `status` - SubscriptionStatus state machine
//! - `subscription` - Stored record and narrowed union

mod accumulator;
mod billing_term;
mod charge;
mod errors;
mod integrity;
mod ledger;
mod payment_purpose;
mod status;
mod subscription;

pub use accumulator::{accumulate, PeriodAccumulation, MAX_ACCUMULATED_DAYS};
pub use billing_term::BillingTerm;
pub use charge::{
    authorized_payment_charge_key, preapproval_charge_key, Charge, ChargeStatus, Claimant,
    PaymentMethod, ProviderCharge, IGNORED_TAG,
};
pub use errors::BillingError;
pub use integrity::{
    check_integrity, check_operation, FieldPresence, IntegrityError, SubscriptionKind,
};
pub use ledger::{LedgerEntry, LedgerEntryStatus, NewLedgerEntry};
pub use payment_purpose::PaymentPurpose;
pub use status::SubscriptionStatus;
pub use subscription::{
    ClientSubscription, PlatformSubscription, Subscription, SubscriptionCore, SubscriptionRecord,
};

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::foundation::{CustomerId, PlanId, SubscriptionId, Timestamp, UserId};

    pub fn ymd(y: i32, m: u32, d: u32) -> Timestamp {
        Timestamp::from_ymd(y, m, d).unwrap()
    }

    pub fn core() -> SubscriptionCore {
        SubscriptionCore {
            id: SubscriptionId::new(),
            owner_id: UserId::new("merchant-1").unwrap(),
            status: SubscriptionStatus::Active,
            plan_label: "Pro".to_string(),
            amount_cents: 4990,
            billing_term: BillingTerm::Monthly,
            start_date: ymd(2024, 1, 1),
            last_billing_date: Some(ymd(2024, 1, 1)),
            next_billing_date: Some(ymd(2024, 2, 1)),
            failed_payments_count: 0,
            created_at: ymd(2024, 1, 1),
            updated_at: ymd(2024, 1, 1),
            cancelled_at: None,
        }
    }

    pub fn platform_record() -> SubscriptionRecord {
        SubscriptionRecord {
            customer_id: None,
            plan_id: None,
            core: core(),
        }
    }

    pub fn client_record() -> SubscriptionRecord {
        SubscriptionRecord {
            customer_id: Some(CustomerId::new()),
            plan_id: Some(PlanId::new()),
            core: core(),
        }
    }
}
