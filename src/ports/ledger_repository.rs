//! Financial ledger repository port.

use crate::domain::billing::{LedgerEntry, NewLedgerEntry};
use crate::domain::foundation::{DomainError, UserId};
use async_trait::async_trait;

/// Repository port for merchant-facing revenue entries.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// True when a stored entry matches `entry` per [`NewLedgerEntry::duplicates`].
    async fn exists_duplicate(&self, entry: &NewLedgerEntry) -> Result<bool, DomainError>;

    async fn insert(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, DomainError>;

    /// All entries of a user, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError>;
}
