//! ChargeSettler - claim, apply, mark applied.
//!
//! A settlement is at-most-once: the claim is taken before any subscription
//! is touched and is never released. A failure after the claim leaves the
//! charge with `applied_at` unset, which the sweeper reports as stalled.

use std::sync::Arc;

use crate::domain::billing::{BillingError, BillingTerm, Charge, Claimant, PaymentPurpose};
use crate::domain::foundation::{ChargeId, SubscriptionId, Timestamp, ValidationError};
use crate::ports::ChargeRepository;

use super::apply_approved_payment::{
    ApplyClientPaymentCommand, ApplyPlatformPaymentCommand, PaymentApplied, PaymentEventProcessor,
};

/// Outcome of settling one charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Claimed and applied by this call.
    Applied {
        charge_id: ChargeId,
        subscription_id: SubscriptionId,
        payment: PaymentApplied,
    },
    /// Someone else holds the claim.
    AlreadyClaimed { charge_id: ChargeId },
    /// Nothing to apply. Order payments are left untouched; unrecognised
    /// metadata is tagged ignored.
    Skipped { charge_id: ChargeId, reason: String },
}

/// Settles paid charges against subscriptions.
pub struct ChargeSettler {
    charges: Arc<dyn ChargeRepository>,
    processor: PaymentEventProcessor,
}

impl ChargeSettler {
    pub fn new(charges: Arc<dyn ChargeRepository>, processor: PaymentEventProcessor) -> Self {
        Self { charges, processor }
    }

    /// Settles `charge` on behalf of `claimant`.
    ///
    /// The payment date is the charge's `paid_at`.
    pub async fn settle(
        &self,
        charge: &Charge,
        claimant: Claimant,
        now: Timestamp,
    ) -> Result<SettlementOutcome, BillingError> {
        let purpose = charge.purpose();

        match &purpose {
            PaymentPurpose::Order { order_id, .. } => {
                tracing::info!(
                    charge_id = %charge.id,
                    %order_id,
                    "Order payment acknowledged, not settled here"
                );
                return Ok(SettlementOutcome::Skipped {
                    charge_id: charge.id,
                    reason: "order payment".to_string(),
                });
            }
            PaymentPurpose::Unknown => {
                if !self.charges.mark_ignored(&charge.id, now).await? {
                    return Ok(SettlementOutcome::AlreadyClaimed {
                        charge_id: charge.id,
                    });
                }
                tracing::warn!(
                    charge_id = %charge.id,
                    external_id = %charge.external_id,
                    "Charge metadata does not describe a subscription payment, ignored"
                );
                return Ok(SettlementOutcome::Skipped {
                    charge_id: charge.id,
                    reason: "unrecognised metadata".to_string(),
                });
            }
            _ => {}
        }

        let Some(claimed) = self.charges.try_claim(&charge.id, claimant, now).await? else {
            tracing::info!(
                charge_id = %charge.id,
                claimant = claimant.as_str(),
                "Charge already claimed by another processor"
            );
            return Ok(SettlementOutcome::AlreadyClaimed {
                charge_id: charge.id,
            });
        };

        let payment_date = claimed.paid_at.unwrap_or(now);

        let applied = match self.apply(&claimed, purpose, payment_date, now).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::error!(
                    charge_id = %claimed.id,
                    external_id = %claimed.external_id,
                    claimant = claimant.as_str(),
                    error = %e,
                    "Settlement failed after claim; charge is stalled"
                );
                return Err(e);
            }
        };

        if let Err(e) = self.charges.mark_applied(&claimed.id, now).await {
            tracing::error!(
                charge_id = %claimed.id,
                subscription_id = %applied.subscription_id,
                error = %e,
                "Payment applied but charge could not be marked applied"
            );
            return Err(e.into());
        }

        tracing::info!(
            charge_id = %claimed.id,
            subscription_id = %applied.subscription_id,
            claimant = claimant.as_str(),
            "Charge settled"
        );

        Ok(SettlementOutcome::Applied {
            charge_id: claimed.id,
            subscription_id: applied.subscription_id,
            payment: applied,
        })
    }

    async fn apply(
        &self,
        charge: &Charge,
        purpose: PaymentPurpose,
        payment_date: Timestamp,
        now: Timestamp,
    ) -> Result<PaymentApplied, BillingError> {
        match purpose {
            PaymentPurpose::PlatformSubscription {
                user_id,
                plan_name,
                term,
                ..
            } => {
                self.processor
                    .apply_approved_payment(ApplyPlatformPaymentCommand {
                        user_id,
                        term_months: i64::from(term.months()),
                        amount_cents: charge.amount_cents,
                        plan_label: plan_name.unwrap_or_else(|| default_plan_label(term)),
                        payment_date,
                        now,
                    })
                    .await
            }
            PaymentPurpose::ClientSubscription {
                subscription_id,
                user_id,
                term,
                ..
            } => {
                self.processor
                    .apply_client_payment(ApplyClientPaymentCommand {
                        owner_id: user_id,
                        subscription_id,
                        term,
                        amount_cents: charge.amount_cents,
                        payment_method: charge.payment_method,
                        payment_date,
                        now,
                    })
                    .await
            }
            PaymentPurpose::Order { .. } | PaymentPurpose::Unknown => {
                Err(BillingError::Validation(ValidationError::invalid_format(
                    "metadata",
                    format!("charge {} has no subscription purpose", charge.id),
                )))
            }
        }
    }
}

fn default_plan_label(term: BillingTerm) -> String {
    match term {
        BillingTerm::Monthly => "Plano Mensal",
        BillingTerm::Semiannual => "Plano Semestral",
        BillingTerm::Annual => "Plano Anual",
    }
    .to_string()
}
