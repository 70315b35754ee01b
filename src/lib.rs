//! Subscription Reconciler - payment reconciliation and subscription lifecycle.
//!
//! This crate turns Mercado Pago and PIX payment notifications into subscription
//! state, for both platform billing and merchant-to-customer plans.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
