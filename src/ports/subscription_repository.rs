//! Subscription repository port.
//!
//! Platform and client subscriptions live in one store. The repository hands
//! back raw [`SubscriptionRecord`]s; callers narrow them through the integrity
//! validator before acting on them.

use crate::domain::billing::SubscriptionRecord;
use crate::domain::foundation::{DomainError, SubscriptionId, UserId};
use async_trait::async_trait;

/// Repository port for subscription persistence.
///
/// Subscriptions are never deleted.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new subscription.
    async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError>;

    /// Update an existing subscription.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the row doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError>;

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Find a subscription owned by `owner_id`. Rows of other owners are `None`.
    async fn find_by_id_for_owner(
        &self,
        id: &SubscriptionId,
        owner_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Newest row of `owner_id` without a customer, by creation time.
    ///
    /// Rows with a plan but no customer are returned too, so the caller's
    /// integrity check sees them.
    async fn find_latest_platform(
        &self,
        owner_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;
}
