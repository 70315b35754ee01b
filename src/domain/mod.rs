//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `billing` - Subscriptions, charges, billing terms and period accumulation
//! - `webhook` - Provider webhook signature and envelope handling

pub mod billing;
pub mod foundation;
pub mod webhook;
