//! Background jobs.

mod reconciliation_scheduler;

pub use reconciliation_scheduler::{ReconciliationScheduler, ReconciliationSchedulerConfig};
