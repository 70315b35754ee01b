//! Period accumulation.
//!
//! Computes the next billing date for an approved payment. When a renewal lands
//! before the current period ends, the unused remainder is carried forward.
//! Two guard-rails bound the result to [`MAX_ACCUMULATED_DAYS`] past the
//! reference instant so corrupted metadata or repeated application cannot push
//! expiry arbitrarily far into the future.

use serde::Serialize;

use crate::domain::foundation::Timestamp;

use super::BillingTerm;

/// Upper bound, in days past the reference instant, for carried-over time and for the result.
pub const MAX_ACCUMULATED_DAYS: i64 = 400;

/// Outcome of [`accumulate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodAccumulation {
    /// Date the new term is added to.
    pub base_date: Timestamp,
    /// Resulting expiry.
    pub next_billing_date: Timestamp,
    /// Whole days of unused time preserved from the previous period.
    pub accumulated_days: i64,
    /// True when either guard-rail clipped the result.
    pub capped: bool,
}

/// Accumulates a billing period.
///
/// * `payment_date` - when the payment happened; the base for lapsed or new subscriptions.
/// * `existing_next_billing_date` - current expiry, if any.
/// * `now` - reference instant. Callers pass the payment's own timestamp so the
///   result does not depend on when the event happens to be processed.
pub fn accumulate(
    payment_date: Timestamp,
    term: BillingTerm,
    existing_next_billing_date: Option<Timestamp>,
    now: Timestamp,
) -> PeriodAccumulation {
    let ceiling = now.add_days(MAX_ACCUMULATED_DAYS);
    let mut capped = false;

    let (mut base_date, mut accumulated_days) = match existing_next_billing_date {
        Some(expiry) if expiry.is_after(&now) => (expiry, expiry.days_until_ceil(&now)),
        _ => (payment_date, 0),
    };

    if accumulated_days > MAX_ACCUMULATED_DAYS {
        accumulated_days = MAX_ACCUMULATED_DAYS;
        base_date = ceiling;
        capped = true;
    }

    let mut next_billing_date = base_date.add_months(term.months());
    if next_billing_date.is_after(&ceiling) {
        next_billing_date = ceiling;
        capped = true;
    }

    PeriodAccumulation {
        base_date,
        next_billing_date,
        accumulated_days,
        capped,
    }
}
