//! Webhook domain module.
//!
//! Untrusted-input handling for provider notifications: signature checks,
//! envelope parsing and shape dispatch. No storage access happens here.

mod envelope;
mod errors;
mod pix;
mod signature;

pub use envelope::{
    classify, signed_data_id, EnvelopeData, WebhookEnvelope, WebhookEvent, WebhookQuery,
};
pub use errors::WebhookError;
pub use pix::{PixNotification, PixPayment};
pub use signature::{
    build_manifest, MercadoPagoSignatureVerifier, SignatureHeader, SignatureInput, Verification,
};

#[cfg(test)]
pub(crate) use signature::compute_test_signature;
