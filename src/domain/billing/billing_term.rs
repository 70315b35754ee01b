//! Billing term - the recurrence length of a subscription.
//!
//! Only three terms exist. Anything else arriving from upstream metadata is
//! coerced to the nearest supported term and the coercion is logged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized recurrence length in months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingTerm {
    /// 1 month.
    Monthly,
    /// 6 months.
    Semiannual,
    /// 12 months.
    Annual,
}

impl BillingTerm {
    /// Number of calendar months covered by one payment.
    pub fn months(&self) -> u32 {
        match self {
            BillingTerm::Monthly => 1,
            BillingTerm::Semiannual => 6,
            BillingTerm::Annual => 12,
        }
    }

    /// Exact mapping for 1, 6 and 12. Returns `None` for anything else.
    pub fn from_months(months: i64) -> Option<Self> {
        match months {
            1 => Some(BillingTerm::Monthly),
            6 => Some(BillingTerm::Semiannual),
            12 => Some(BillingTerm::Annual),
            _ => None,
        }
    }

    /// Coerces an arbitrary month count: `<= 3` is monthly, `<= 9` semiannual, otherwise annual.
    ///
    /// Values that are not exactly 1, 6 or 12 are logged as a warning.
    pub fn normalize(months: i64) -> Self {
        if let Some(term) = Self::from_months(months) {
            return term;
        }

        let term = if months <= 3 {
            BillingTerm::Monthly
        } else if months <= 9 {
            BillingTerm::Semiannual
        } else {
            BillingTerm::Annual
        };

        tracing::warn!(
            requested_months = months,
            normalized_months = term.months(),
            "Unsupported billing term coerced"
        );
        term
    }

    /// Parses a billing frequency label as used in checkout metadata.
    ///
    /// Accepts English and Portuguese spellings, or a bare month count.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "monthly" | "month" | "mensal" => Some(BillingTerm::Monthly),
            "semiannual" | "semi_annual" | "semiannually" | "semestral" => {
                Some(BillingTerm::Semiannual)
            }
            "annual" | "annually" | "yearly" | "year" | "anual" => Some(BillingTerm::Annual),
            other => other.parse::<i64>().ok().map(Self::normalize),
        }
    }

    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingTerm::Monthly => "monthly",
            BillingTerm::Semiannual => "semiannual",
            BillingTerm::Annual => "annual",
        }
    }
}

impl fmt::Display for BillingTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
