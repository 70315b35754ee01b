//! Charge entity - one provider transaction (PIX or card).
//!
//! A charge is settled at most once. The `processed_at`/`processed_for` pair is
//! written by a single conditional update (the claim); `applied_at` is written
//! afterwards when the subscription mutation went through.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{ChargeId, StateMachine, Timestamp, UserId, ValidationError};

use super::PaymentPurpose;

/// Provider-side status of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Paid => "paid",
            ChargeStatus::Expired => "expired",
            ChargeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChargeStatus::Pending),
            "paid" => Ok(ChargeStatus::Paid),
            "expired" => Ok(ChargeStatus::Expired),
            "cancelled" | "canceled" => Ok(ChargeStatus::Cancelled),
            other => Err(ValidationError::invalid_format(
                "charge_status",
                format!("unknown charge status '{}'", other),
            )),
        }
    }
}

impl StateMachine for ChargeStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ChargeStatus::*;
        matches!(
            (self, target),
            (Pending, Paid) | (Pending, Expired) | (Pending, Cancelled)
                // A PIX payment may clear after the QR code expired
                | (Expired, Paid)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ChargeStatus::*;
        match self {
            Pending => vec![Paid, Expired, Cancelled],
            Expired => vec![Paid],
            Paid | Cancelled => vec![],
        }
    }
}

/// How the customer paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
    DebitCard,
    Boleto,
    Other,
}

impl PaymentMethod {
    /// Maps a provider payment method or payment type id.
    pub fn from_provider(id: &str) -> Self {
        match id.to_ascii_lowercase().as_str() {
            "pix" | "bank_transfer" => PaymentMethod::Pix,
            "credit_card" | "prepaid_card" => PaymentMethod::CreditCard,
            "debit_card" => PaymentMethod::DebitCard,
            "ticket" | "boleto" | "bolbradesco" => PaymentMethod::Boleto,
            _ => PaymentMethod::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Boleto => "boleto",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded charge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Charge {
    pub id: ChargeId,
    pub owner_id: UserId,

    /// PIX txid or provider payment id. Unique.
    pub external_id: String,

    pub status: ChargeStatus,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,

    /// Payment purpose as attached at checkout.
    pub metadata: Value,

    pub created_at: Timestamp,
    pub paid_at: Option<Timestamp>,

    /// Set once by the claim.
    pub processed_at: Option<Timestamp>,
    /// Which processor won the claim.
    pub processed_for: Option<String>,

    /// Set after the claimed settlement mutated the subscription.
    pub applied_at: Option<Timestamp>,
}

impl Charge {
    /// New pending charge, e.g. a freshly issued PIX QR code.
    pub fn pending(
        owner_id: UserId,
        external_id: impl Into<String>,
        amount_cents: i64,
        payment_method: PaymentMethod,
        metadata: Value,
        now: Timestamp,
    ) -> Self {
        Self {
            id: ChargeId::new(),
            owner_id,
            external_id: external_id.into(),
            status: ChargeStatus::Pending,
            amount_cents,
            payment_method,
            metadata,
            created_at: now,
            paid_at: None,
            processed_at: None,
            processed_for: None,
            applied_at: None,
        }
    }

    /// Decodes what the payment was for.
    pub fn purpose(&self) -> PaymentPurpose {
        PaymentPurpose::from_metadata(&self.metadata)
    }

    pub fn is_claimed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Taken out of settlement because its metadata names no purpose.
    pub fn is_ignored(&self) -> bool {
        self.processed_for.as_deref() == Some(IGNORED_TAG)
    }

    /// Paid and not yet claimed by anyone.
    pub fn is_settleable(&self) -> bool {
        self.status == ChargeStatus::Paid && self.processed_at.is_none()
    }

    /// Claimed longer than `grace` ago without the settlement completing.
    pub fn is_stalled(&self, now: Timestamp, grace: chrono::Duration) -> bool {
        match (self.processed_at, self.applied_at) {
            (Some(claimed), None) if !self.is_ignored() => now.duration_since(&claimed) >= grace,
            _ => false,
        }
    }
}

/// A paid provider transaction to upsert by `external_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCharge {
    pub owner_id: UserId,
    pub external_id: String,
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub metadata: Value,
    pub paid_at: Timestamp,
}

impl ProviderCharge {
    /// The charge row a first sighting of this transaction inserts.
    pub fn into_charge(self, now: Timestamp) -> Charge {
        Charge {
            id: ChargeId::new(),
            owner_id: self.owner_id,
            external_id: self.external_id,
            status: ChargeStatus::Paid,
            amount_cents: self.amount_cents,
            payment_method: self.payment_method,
            metadata: self.metadata,
            created_at: now,
            paid_at: Some(self.paid_at),
            processed_at: None,
            processed_for: None,
            applied_at: None,
        }
    }
}

/// External id for a charge recorded from an authorized preapproval.
pub fn preapproval_charge_key(preapproval_id: &str) -> String {
    format!("preapproval:{}", preapproval_id)
}

/// External id for a charge recorded from a recurring authorized payment.
pub fn authorized_payment_charge_key(authorized_payment_id: &str) -> String {
    format!("authorized_payment:{}", authorized_payment_id)
}

/// `processed_for` value of a charge that will never be applied.
pub const IGNORED_TAG: &str = "ignored";

/// Processor tag written to `processed_for` by the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Claimant {
    PaymentWebhook,
    PreapprovalWebhook,
    AuthorizedPaymentWebhook,
    PixWebhook,
    Sweeper,
}

impl Claimant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Claimant::PaymentWebhook => "payment_webhook",
            Claimant::PreapprovalWebhook => "preapproval_webhook",
            Claimant::AuthorizedPaymentWebhook => "authorized_payment_webhook",
            Claimant::PixWebhook => "pix_webhook",
            Claimant::Sweeper => "sweeper",
        }
    }
}

impl fmt::Display for Claimant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
