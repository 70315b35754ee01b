//! In-memory storage adapters for tests and local development.

mod charge_repository;
mod ledger_repository;
mod subscription_repository;

pub use charge_repository::InMemoryChargeRepository;
pub use ledger_repository::InMemoryLedgerRepository;
pub use subscription_repository::InMemorySubscriptionRepository;
