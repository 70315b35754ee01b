//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `memory` - In-memory repositories (tests, local runs)
//! - `postgres` - PostgreSQL repositories
//! - `mercadopago` - Mercado Pago REST client and mock
//! - `http` - axum routes and handlers
//! - `scheduling` - Background reconciliation loop

pub mod http;
pub mod memory;
pub mod mercadopago;
pub mod postgres;
pub mod scheduling;

pub use scheduling::{ReconciliationScheduler, ReconciliationSchedulerConfig};
