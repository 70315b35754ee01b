//! ReconcilePendingChargesHandler - the reconciliation sweeper.
//!
//! Re-drives settlement for paid charges whose notification never arrived.
//! Runs on a schedule for all owners and on demand for one owner
//! (`check_pending_payments`).
//!
//! Steps:
//! 1. Refresh pending charges from the provider
//! 2. Settle paid, unclaimed charges, oldest `paid_at` first
//! 3. Report stalled settlements (global sweeps only)

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, ChargeStatus, Claimant};
use crate::domain::foundation::{ChargeId, Timestamp, UserId};
use crate::ports::{ChargeRepository, PaymentErrorCode, PaymentGateway};

use super::settle_charge::{ChargeSettler, SettlementOutcome};

/// Sweeper tuning.
#[derive(Debug, Clone)]
pub struct SweeperSettings {
    /// Paid charges settled per run.
    pub batch_size: u32,
    /// Pending charges refreshed per run.
    pub pending_batch_size: u32,
    /// Claims older than this without `applied_at` are reported.
    pub stalled_after: chrono::Duration,
    pub refresh_pending: bool,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            pending_batch_size: 50,
            stalled_after: chrono::Duration::minutes(15),
            refresh_pending: true,
        }
    }
}

/// Command to run one sweep.
#[derive(Debug, Clone)]
pub struct ReconcilePendingChargesCommand {
    /// `None` sweeps every owner.
    pub owner_id: Option<UserId>,
    pub now: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSettlement {
    pub charge_id: ChargeId,
    pub error: String,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Pending charges whose status changed after the provider refresh.
    pub refreshed: usize,
    /// Paid, unclaimed non-order charges found.
    pub total_paid: usize,
    /// Of those, the ones that pay for a subscription.
    pub total_eligible: usize,
    /// Charges settled by this sweep.
    pub processed: Vec<ChargeId>,
    /// Lost the claim or nothing to apply.
    pub skipped: usize,
    pub failed: Vec<FailedSettlement>,
    /// Claimed but never applied.
    pub stalled: Vec<ChargeId>,
}

pub struct ReconcilePendingChargesHandler {
    charges: Arc<dyn ChargeRepository>,
    gateway: Arc<dyn PaymentGateway>,
    settler: Arc<ChargeSettler>,
    settings: SweeperSettings,
}

impl ReconcilePendingChargesHandler {
    pub fn new(
        charges: Arc<dyn ChargeRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settler: Arc<ChargeSettler>,
        settings: SweeperSettings,
    ) -> Self {
        Self {
            charges,
            gateway,
            settler,
            settings,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReconcilePendingChargesCommand,
    ) -> Result<SweepReport, BillingError> {
        let owner = cmd.owner_id.as_ref();
        let mut report = SweepReport::default();

        // 1. Refresh pending charges
        if self.settings.refresh_pending {
            report.refreshed = self.refresh_pending(owner, cmd.now).await?;
        }

        // 2. Settle paid, unclaimed charges
        let paid = self
            .charges
            .list_paid_unprocessed(owner, self.settings.batch_size)
            .await?;
        report.total_paid = paid.len();
        report.total_eligible = paid.iter().filter(|c| c.purpose().is_subscription()).count();

        for charge in &paid {
            match self.settler.settle(charge, Claimant::Sweeper, cmd.now).await {
                Ok(SettlementOutcome::Applied { charge_id, .. }) => {
                    report.processed.push(charge_id)
                }
                Ok(SettlementOutcome::AlreadyClaimed { .. })
                | Ok(SettlementOutcome::Skipped { .. }) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(
                        charge_id = %charge.id,
                        error = %e,
                        "Sweeper failed to settle charge"
                    );
                    report.failed.push(FailedSettlement {
                        charge_id: charge.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        // 3. Stalled settlements
        if owner.is_none() {
            report.stalled = self.find_stalled(cmd.now).await?;
        }

        tracing::info!(
            owner_id = ?cmd.owner_id.as_ref().map(UserId::as_str),
            refreshed = report.refreshed,
            total_paid = report.total_paid,
            total_eligible = report.total_eligible,
            processed = report.processed.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            stalled = report.stalled.len(),
            "Reconciliation sweep finished"
        );

        Ok(report)
    }

    async fn refresh_pending(
        &self,
        owner: Option<&UserId>,
        now: Timestamp,
    ) -> Result<usize, BillingError> {
        let pending = self
            .charges
            .list_pending(owner, self.settings.pending_batch_size)
            .await?;
        let mut changed = 0;

        for charge in pending {
            let payment = match self.gateway.get_payment(&charge.external_id).await {
                Ok(payment) => payment,
                Err(e) if e.code == PaymentErrorCode::NotFound => {
                    tracing::debug!(charge_id = %charge.id, "Pending charge unknown to provider");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        charge_id = %charge.id,
                        error = %e,
                        "Failed to refresh pending charge"
                    );
                    continue;
                }
            };

            let updated = if payment.status.is_approved() {
                self.charges
                    .mark_paid(&charge.id, payment.payment_date(now))
                    .await?
                    .is_some()
            } else if payment.status.is_failed() {
                self.charges.mark_closed(&charge.id, ChargeStatus::Cancelled).await?
            } else if payment.date_of_expiration.map_or(false, |at| at.is_before(&now)) {
                self.charges.mark_closed(&charge.id, ChargeStatus::Expired).await?
            } else {
                false
            };

            if updated {
                tracing::info!(
                    charge_id = %charge.id,
                    provider_status = ?payment.status,
                    "Pending charge refreshed from provider"
                );
                changed += 1;
            }
        }

        Ok(changed)
    }

    async fn find_stalled(&self, now: Timestamp) -> Result<Vec<ChargeId>, BillingError> {
        let claimed_before =
            Timestamp::from_datetime(*now.as_datetime() - self.settings.stalled_after);
        let stalled = self
            .charges
            .list_stalled(claimed_before, self.settings.batch_size)
            .await?;

        for charge in &stalled {
            tracing::error!(
                charge_id = %charge.id,
                external_id = %charge.external_id,
                processed_for = ?charge.processed_for,
                processed_at = ?charge.processed_at,
                "Stalled settlement: charge claimed but never applied, needs manual review"
            );
        }

        Ok(stalled.into_iter().map(|c| c.id).collect())
    }
}
