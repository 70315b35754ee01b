//! Merchant-facing financial ledger entries.
//!
//! Written only for client-scope payments: revenue the merchant received from
//! their own customer. Platform payments are the merchant's expense and never
//! appear here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{LedgerEntryId, SubscriptionId, Timestamp, UserId};

use super::PaymentMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryStatus {
    Completed,
}

impl LedgerEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for LedgerEntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub amount_cents: i64,
    pub description: String,
    pub payment_method: PaymentMethod,
    pub status: LedgerEntryStatus,
    pub occurred_at: Timestamp,
}

impl NewLedgerEntry {
    /// Completed revenue entry for a client subscription payment.
    pub fn subscription_payment(
        user_id: UserId,
        subscription_id: SubscriptionId,
        amount_cents: i64,
        plan_label: &str,
        payment_method: PaymentMethod,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            user_id,
            subscription_id,
            amount_cents,
            description: format!("Subscription payment - {}", plan_label),
            payment_method,
            status: LedgerEntryStatus::Completed,
            occurred_at,
        }
    }

    /// Field match used to detect a duplicate of this entry.
    ///
    /// Entries on different calendar days (UTC) never match, so a renewal with
    /// the same amount and plan still gets its own row.
    pub fn duplicates(&self, other: &LedgerEntry) -> bool {
        self.occurred_at.as_datetime().date_naive() == other.occurred_at.as_datetime().date_naive()
            && self.user_id == other.user_id
            && self.amount_cents == other.amount_cents
            && self.description == other.description
            && self.payment_method == other.payment_method
            && self.status == other.status
    }
}

/// Stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub subscription_id: Option<SubscriptionId>,
    pub amount_cents: i64,
    pub description: String,
    pub payment_method: PaymentMethod,
    pub status: LedgerEntryStatus,
    pub occurred_at: Timestamp,
}

impl LedgerEntry {
    pub fn from_new(id: LedgerEntryId, entry: NewLedgerEntry) -> Self {
        Self {
            id,
            user_id: entry.user_id,
            subscription_id: Some(entry.subscription_id),
            amount_cents: entry.amount_cents,
            description: entry.description,
            payment_method: entry.payment_method,
            status: entry.status,
            occurred_at: entry.occurred_at,
        }
    }
}
