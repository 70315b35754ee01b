//! Subscription status state machine.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status shared by platform and client subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Evaluation period before the first payment.
    Trial,

    /// Paid and current.
    Active,

    /// Access paused by the merchant or operator.
    Suspended,

    /// Cancelled by the owner. Only an approved payment brings it back.
    Cancelled,

    /// A renewal charge failed.
    PaymentFailed,
}

impl SubscriptionStatus {
    /// Statuses the reactivation checkout may be started from.
    pub fn is_reactivatable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Cancelled
                | SubscriptionStatus::Suspended
                | SubscriptionStatus::PaymentFailed
        )
    }

    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::PaymentFailed => "payment_failed",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            "payment_failed" => Ok(SubscriptionStatus::PaymentFailed),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From TRIAL
            (Trial, Active)
                | (Trial, Cancelled)
                | (Trial, Suspended)
            // From ACTIVE
                | (Active, Active) // Renewal
                | (Active, Cancelled)
                | (Active, PaymentFailed)
                | (Active, Suspended)
            // From PAYMENT_FAILED
                | (PaymentFailed, Active)
                | (PaymentFailed, Cancelled)
                | (PaymentFailed, Suspended)
            // From SUSPENDED
                | (Suspended, Active)
                | (Suspended, Cancelled)
            // From CANCELLED - an approved payment only
                | (Cancelled, Active)
                | (Cancelled, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trial => vec![Active, Cancelled, Suspended],
            Active => vec![Active, Cancelled, PaymentFailed, Suspended],
            PaymentFailed => vec![Active, Cancelled, Suspended],
            Suspended => vec![Active, Cancelled],
            Cancelled => vec![Active, Cancelled],
        }
    }
}
