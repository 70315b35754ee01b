//! In-memory charge repository.
//!
//! The claim is a compare-and-set performed while holding the write lock, which
//! gives the same exclusivity as the conditional update in PostgreSQL within
//! one process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{Charge, ChargeStatus, Claimant, ProviderCharge, IGNORED_TAG};
use crate::domain::foundation::{ChargeId, DomainError, ErrorCode, StateMachine, Timestamp, UserId};
use crate::ports::ChargeRepository;

/// In-memory storage for charges.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChargeRepository {
    rows: Arc<RwLock<HashMap<ChargeId, Charge>>>,
}

impl InMemoryChargeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Charge> {
        self.rows.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

fn owned_by(charge: &Charge, owner_id: Option<&UserId>) -> bool {
    owner_id.map_or(true, |o| &charge.owner_id == o)
}

#[async_trait]
impl ChargeRepository for InMemoryChargeRepository {
    async fn insert(&self, charge: &Charge) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if rows.values().any(|c| c.external_id == charge.external_id) {
            return Err(DomainError::new(
                ErrorCode::Conflict,
                format!("Charge with external id {} already exists", charge.external_id),
            ));
        }
        rows.insert(charge.id, charge.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ChargeId) -> Result<Option<Charge>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Charge>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|c| c.external_id == external_id)
            .cloned())
    }

    async fn record_paid(
        &self,
        charge: ProviderCharge,
        now: Timestamp,
    ) -> Result<Charge, DomainError> {
        let mut rows = self.rows.write().await;

        if let Some(existing) = rows.values_mut().find(|c| c.external_id == charge.external_id) {
            existing.status = ChargeStatus::Paid;
            if existing.paid_at.is_none() {
                existing.paid_at = Some(charge.paid_at);
            }
            return Ok(existing.clone());
        }

        let stored = charge.into_charge(now);
        rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn mark_paid(
        &self,
        id: &ChargeId,
        paid_at: Timestamp,
    ) -> Result<Option<Charge>, DomainError> {
        let mut rows = self.rows.write().await;
        let charge = rows.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::ChargeNotFound, format!("Charge {} not found", id))
        })?;

        if !charge.status.can_transition_to(&ChargeStatus::Paid) {
            return Ok(None);
        }
        charge.status = ChargeStatus::Paid;
        charge.paid_at = Some(paid_at);
        Ok(Some(charge.clone()))
    }

    async fn mark_closed(&self, id: &ChargeId, status: ChargeStatus) -> Result<bool, DomainError> {
        let mut rows = self.rows.write().await;
        let charge = rows.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::ChargeNotFound, format!("Charge {} not found", id))
        })?;

        if charge.status != ChargeStatus::Pending || !charge.status.can_transition_to(&status) {
            return Ok(false);
        }
        charge.status = status;
        Ok(true)
    }

    async fn try_claim(
        &self,
        id: &ChargeId,
        claimant: Claimant,
        now: Timestamp,
    ) -> Result<Option<Charge>, DomainError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(id) {
            Some(charge) if charge.processed_at.is_none() => {
                charge.processed_at = Some(now);
                charge.processed_for = Some(claimant.as_str().to_string());
                Ok(Some(charge.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_ignored(&self, id: &ChargeId, now: Timestamp) -> Result<bool, DomainError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(id) {
            Some(charge) if charge.processed_at.is_none() => {
                charge.processed_at = Some(now);
                charge.processed_for = Some(IGNORED_TAG.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_applied(&self, id: &ChargeId, now: Timestamp) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let charge = rows.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::ChargeNotFound, format!("Charge {} not found", id))
        })?;
        charge.applied_at = Some(now);
        Ok(())
    }

    async fn list_paid_unprocessed(
        &self,
        owner_id: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError> {
        let rows = self.rows.read().await;
        let mut charges: Vec<Charge> = rows
            .values()
            .filter(|c| c.is_settleable() && !c.purpose().is_order() && owned_by(c, owner_id))
            .cloned()
            .collect();
        charges.sort_by_key(|c| (c.paid_at.is_none(), c.paid_at, c.created_at));
        charges.truncate(limit as usize);
        Ok(charges)
    }

    async fn list_pending(
        &self,
        owner_id: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError> {
        let rows = self.rows.read().await;
        let mut charges: Vec<Charge> = rows
            .values()
            .filter(|c| c.status == ChargeStatus::Pending && owned_by(c, owner_id))
            .cloned()
            .collect();
        charges.sort_by_key(|c| c.created_at);
        charges.truncate(limit as usize);
        Ok(charges)
    }

    async fn list_stalled(
        &self,
        claimed_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError> {
        let rows = self.rows.read().await;
        let mut charges: Vec<Charge> = rows
            .values()
            .filter(|c| {
                c.applied_at.is_none()
                    && !c.is_ignored()
                    && c.processed_at.map_or(false, |at| at.is_before(&claimed_before))
            })
            .cloned()
            .collect();
        charges.sort_by_key(|c| c.processed_at);
        charges.truncate(limit as usize);
        Ok(charges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PaymentMethod;
    use serde_json::json;

    fn owner() -> UserId {
        UserId::new("merchant-1").unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> Timestamp {
        Timestamp::from_ymd(y, m, d).unwrap()
    }

    fn provider_charge(external_id: &str, paid_at: Timestamp) -> ProviderCharge {
        ProviderCharge {
            owner_id: owner(),
            external_id: external_id.to_string(),
            amount_cents: 4990,
            payment_method: PaymentMethod::Pix,
            metadata: json!({}),
            paid_at,
        }
    }

    #[tokio::test]
    async fn record_paid_is_an_upsert() {
        let repo = InMemoryChargeRepository::new();
        let first = repo
            .record_paid(provider_charge("p-1", ymd(2024, 1, 1)), ymd(2024, 1, 1))
            .await
            .unwrap();
        let second = repo
            .record_paid(provider_charge("p-1", ymd(2024, 1, 5)), ymd(2024, 1, 5))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.paid_at, Some(ymd(2024, 1, 1)));
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn record_paid_keeps_existing_claim() {
        let repo = InMemoryChargeRepository::new();
        let charge = repo
            .record_paid(provider_charge("p-1", ymd(2024, 1, 1)), ymd(2024, 1, 1))
            .await
            .unwrap();
        repo.try_claim(&charge.id, Claimant::PaymentWebhook, ymd(2024, 1, 1)).await.unwrap();

        let again = repo
            .record_paid(provider_charge("p-1", ymd(2024, 1, 1)), ymd(2024, 1, 2))
            .await
            .unwrap();
        assert!(again.is_claimed());
    }

    #[tokio::test]
    async fn claim_succeeds_once() {
        let repo = InMemoryChargeRepository::new();
        let charge = repo
            .record_paid(provider_charge("p-1", ymd(2024, 1, 1)), ymd(2024, 1, 1))
            .await
            .unwrap();

        let first = repo.try_claim(&charge.id, Claimant::Sweeper, ymd(2024, 1, 2)).await.unwrap();
        let second = repo
            .try_claim(&charge.id, Claimant::PaymentWebhook, ymd(2024, 1, 2))
            .await
            .unwrap();

        assert_eq!(first.unwrap().processed_for.as_deref(), Some("sweeper"));
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn claim_of_missing_charge_is_none() {
        let repo = InMemoryChargeRepository::new();
        assert!(repo
            .try_claim(&ChargeId::new(), Claimant::Sweeper, ymd(2024, 1, 1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn paid_unprocessed_is_oldest_first_and_scoped() {
        let repo = InMemoryChargeRepository::new();
        repo.record_paid(provider_charge("late", ymd(2024, 3, 1)), ymd(2024, 3, 1)).await.unwrap();
        repo.record_paid(provider_charge("early", ymd(2024, 1, 1)), ymd(2024, 3, 1)).await.unwrap();
        let mut foreign = provider_charge("foreign", ymd(2024, 2, 1));
        foreign.owner_id = UserId::new("merchant-2").unwrap();
        repo.record_paid(foreign, ymd(2024, 3, 1)).await.unwrap();

        let all = repo.list_paid_unprocessed(None, 10).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "foreign", "late"]);

        let mine = repo.list_paid_unprocessed(Some(&owner()), 10).await.unwrap();
        assert_eq!(mine.len(), 2);

        let limited = repo.list_paid_unprocessed(None, 1).await.unwrap();
        assert_eq!(limited[0].external_id, "early");
    }

    #[tokio::test]
    async fn paid_unprocessed_excludes_orders_before_limit() {
        let repo = InMemoryChargeRepository::new();
        for (i, day) in [1, 2, 3].into_iter().enumerate() {
            let mut order = provider_charge(&format!("order-{}", i), ymd(2024, 1, day));
            order.metadata = json!({"order_id": format!("o-{}", i)});
            repo.record_paid(order, ymd(2024, 1, day)).await.unwrap();
        }
        let mut platform = provider_charge("platform", ymd(2024, 1, 9));
        platform.metadata = json!({"type": "platform_subscription", "userId": "merchant-1"});
        repo.record_paid(platform, ymd(2024, 1, 9)).await.unwrap();

        let found = repo.list_paid_unprocessed(None, 1).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_id, "platform");
    }

    #[tokio::test]
    async fn paid_unprocessed_puts_undated_charges_last() {
        let repo = InMemoryChargeRepository::new();
        let mut undated =
            Charge::pending(owner(), "u-1", 100, PaymentMethod::Pix, json!({}), ymd(2024, 1, 1));
        undated.status = ChargeStatus::Paid;
        repo.insert(&undated).await.unwrap();
        repo.record_paid(provider_charge("dated", ymd(2024, 2, 1)), ymd(2024, 2, 1)).await.unwrap();

        let found = repo.list_paid_unprocessed(None, 10).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["dated", "u-1"]);
    }

    #[tokio::test]
    async fn ignored_charge_leaves_scan_and_is_not_stalled() {
        let repo = InMemoryChargeRepository::new();
        let charge = repo
            .record_paid(provider_charge("p-1", ymd(2024, 1, 1)), ymd(2024, 1, 1))
            .await
            .unwrap();

        assert!(repo.mark_ignored(&charge.id, ymd(2024, 1, 1)).await.unwrap());
        assert!(!repo.mark_ignored(&charge.id, ymd(2024, 1, 2)).await.unwrap());
        assert!(repo
            .try_claim(&charge.id, Claimant::Sweeper, ymd(2024, 1, 2))
            .await
            .unwrap()
            .is_none());

        assert!(repo.list_paid_unprocessed(None, 10).await.unwrap().is_empty());
        assert!(repo.list_stalled(ymd(2024, 2, 1), 10).await.unwrap().is_empty());
        let stored = repo.find_by_id(&charge.id).await.unwrap().unwrap();
        assert_eq!(stored.processed_for.as_deref(), Some("ignored"));
    }

    #[tokio::test]
    async fn mark_paid_only_from_payable_status() {
        let repo = InMemoryChargeRepository::new();
        let charge =
            Charge::pending(owner(), "tx-1", 100, PaymentMethod::Pix, json!({}), ymd(2024, 1, 1));
        repo.insert(&charge).await.unwrap();

        assert!(repo.mark_paid(&charge.id, ymd(2024, 1, 2)).await.unwrap().is_some());
        assert!(repo.mark_paid(&charge.id, ymd(2024, 1, 3)).await.unwrap().is_none());
        assert_eq!(
            repo.find_by_id(&charge.id).await.unwrap().unwrap().paid_at,
            Some(ymd(2024, 1, 2))
        );
    }

    #[tokio::test]
    async fn mark_closed_only_from_pending() {
        let repo = InMemoryChargeRepository::new();
        let charge =
            Charge::pending(owner(), "tx-1", 100, PaymentMethod::Pix, json!({}), ymd(2024, 1, 1));
        repo.insert(&charge).await.unwrap();

        assert!(repo.mark_closed(&charge.id, ChargeStatus::Expired).await.unwrap());
        assert!(!repo.mark_closed(&charge.id, ChargeStatus::Cancelled).await.unwrap());
    }

    #[tokio::test]
    async fn stalled_lists_claimed_but_unapplied() {
        let repo = InMemoryChargeRepository::new();
        let stalled = repo
            .record_paid(provider_charge("a", ymd(2024, 1, 1)), ymd(2024, 1, 1))
            .await
            .unwrap();
        let applied = repo
            .record_paid(provider_charge("b", ymd(2024, 1, 1)), ymd(2024, 1, 1))
            .await
            .unwrap();
        repo.try_claim(&stalled.id, Claimant::Sweeper, ymd(2024, 1, 1)).await.unwrap();
        repo.try_claim(&applied.id, Claimant::Sweeper, ymd(2024, 1, 1)).await.unwrap();
        repo.mark_applied(&applied.id, ymd(2024, 1, 1)).await.unwrap();

        let found = repo.list_stalled(ymd(2024, 1, 2), 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stalled.id);
    }

    #[tokio::test]
    async fn duplicate_external_id_conflicts() {
        let repo = InMemoryChargeRepository::new();
        let a =
            Charge::pending(owner(), "tx-1", 100, PaymentMethod::Pix, json!({}), ymd(2024, 1, 1));
        let b =
            Charge::pending(owner(), "tx-1", 100, PaymentMethod::Pix, json!({}), ymd(2024, 1, 1));
        repo.insert(&a).await.unwrap();
        assert_eq!(repo.insert(&b).await.unwrap_err().code, ErrorCode::Conflict);
    }
}
