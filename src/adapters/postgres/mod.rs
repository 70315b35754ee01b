//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionRepository` - platform and client subscriptions
//! - `PostgresChargeRepository` - provider transactions and the idempotency claim
//! - `PostgresLedgerRepository` - completed revenue entries

mod charge_repository;
mod ledger_repository;
mod subscription_repository;

pub use charge_repository::PostgresChargeRepository;
pub use ledger_repository::PostgresLedgerRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
