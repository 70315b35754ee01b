//! Mercado Pago payment gateway adapters.

mod api_types;
mod client;
mod mock_gateway;

pub use client::{MercadoPagoConfig, MercadoPagoGateway};
pub use mock_gateway::MockPaymentGateway;
