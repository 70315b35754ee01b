//! Charge repository port.
//!
//! Owns the idempotency claim. `try_claim` must be a single atomic
//! compare-and-set in the backing store: exactly one of any number of
//! concurrent callers gets the charge back, across processes.

use crate::domain::billing::{Charge, ChargeStatus, Claimant, ProviderCharge};
use crate::domain::foundation::{ChargeId, DomainError, Timestamp, UserId};
use async_trait::async_trait;

/// Repository port for charges.
#[async_trait]
pub trait ChargeRepository: Send + Sync {
    /// Insert a new charge.
    ///
    /// # Errors
    ///
    /// - `Conflict` if `external_id` is already taken
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, charge: &Charge) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &ChargeId) -> Result<Option<Charge>, DomainError>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Charge>, DomainError>;

    /// Upsert a paid provider transaction by `external_id`.
    ///
    /// An existing row becomes `paid` and keeps its first `paid_at`; claim
    /// columns are never touched. Returns the stored row.
    async fn record_paid(
        &self,
        charge: ProviderCharge,
        now: Timestamp,
    ) -> Result<Charge, DomainError>;

    /// Mark a pending or expired charge paid.
    ///
    /// Returns `None` when the charge was not in a payable status.
    async fn mark_paid(
        &self,
        id: &ChargeId,
        paid_at: Timestamp,
    ) -> Result<Option<Charge>, DomainError>;

    /// Move a pending charge to `expired` or `cancelled`.
    ///
    /// Returns `false` when the charge was no longer pending.
    async fn mark_closed(&self, id: &ChargeId, status: ChargeStatus) -> Result<bool, DomainError>;

    /// Atomically claim a charge for processing.
    ///
    /// Sets `processed_at`/`processed_for` only while `processed_at` is null.
    /// `None` means someone else holds the claim.
    async fn try_claim(
        &self,
        id: &ChargeId,
        claimant: Claimant,
        now: Timestamp,
    ) -> Result<Option<Charge>, DomainError>;

    /// Record that the claimed settlement finished.
    async fn mark_applied(&self, id: &ChargeId, now: Timestamp) -> Result<(), DomainError>;

    /// Tag a paid, unclaimed charge as ignored so scans stop returning it.
    ///
    /// Same compare-and-set as `try_claim`; `false` means it was already
    /// claimed or ignored.
    async fn mark_ignored(&self, id: &ChargeId, now: Timestamp) -> Result<bool, DomainError>;

    /// Paid, unclaimed charges, oldest `paid_at` first, undated last.
    ///
    /// Order payments are excluded here, before `limit` applies; they are
    /// settled by the order flow and never claimed by this service.
    async fn list_paid_unprocessed(
        &self,
        owner_id: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError>;

    /// Pending charges, oldest first.
    async fn list_pending(
        &self,
        owner_id: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError>;

    /// Claimed before `claimed_before` but never applied. Ignored charges
    /// are not stalled.
    async fn list_stalled(
        &self,
        claimed_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError>;
}
