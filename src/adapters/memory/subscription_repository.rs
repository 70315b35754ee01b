//! In-memory subscription repository.
//!
//! Useful for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::SubscriptionRecord;
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};
use crate::ports::SubscriptionRepository;

/// In-memory storage for subscriptions.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionRepository {
    rows: Arc<RwLock<HashMap<SubscriptionId, SubscriptionRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert/update fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a row as-is, bypassing validation (seeding corrupt rows in tests).
    pub async fn seed(&self, record: SubscriptionRecord) {
        self.rows.write().await.insert(record.core.id, record);
    }

    pub async fn all(&self) -> Vec<SubscriptionRecord> {
        self.rows.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }

    fn check_writable(&self) -> Result<(), DomainError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::database("simulated subscription write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        self.check_writable()?;
        let mut rows = self.rows.write().await;
        if rows.contains_key(&record.core.id) {
            return Err(DomainError::new(
                ErrorCode::Conflict,
                format!("Subscription {} already exists", record.core.id),
            ));
        }
        rows.insert(record.core.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        self.check_writable()?;
        let mut rows = self.rows.write().await;
        match rows.get_mut(&record.core.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", record.core.id),
            )),
        }
    }

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_id_for_owner(
        &self,
        id: &SubscriptionId,
        owner_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .get(id)
            .filter(|r| &r.core.owner_id == owner_id)
            .cloned())
    }

    async fn find_latest_platform(
        &self,
        owner_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| &r.core.owner_id == owner_id && r.customer_id.is_none())
            .max_by_key(|r| r.core.created_at)
            .cloned())
    }
}
