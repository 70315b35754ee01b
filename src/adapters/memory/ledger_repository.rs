//! In-memory ledger repository.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{LedgerEntry, NewLedgerEntry};
use crate::domain::foundation::{DomainError, LedgerEntryId, UserId};
use crate::ports::LedgerRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerRepository {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn exists_duplicate(&self, entry: &NewLedgerEntry) -> Result<bool, DomainError> {
        Ok(self.entries.read().await.iter().any(|e| entry.duplicates(e)))
    }

    async fn insert(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, DomainError> {
        let stored = LedgerEntry::from_new(LedgerEntryId::new(), entry);
        self.entries.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError> {
        let mut entries: Vec<LedgerEntry> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(entries)
    }
}
