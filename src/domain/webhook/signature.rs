//! Mercado Pago webhook signature verification.
//!
//! The provider signs `id:{data.id};request-id:{x-request-id};ts:{ts};` with
//! HMAC-SHA256 and sends `x-signature: ts=<unix>,v1=<hex>`. Segments whose
//! value is absent are left out of the manifest.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::Timestamp;

use super::WebhookError;

/// Timestamps above this are milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Parsed components from the `x-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// `ts` exactly as sent; the manifest uses it verbatim.
    pub ts: String,
    /// `ts` as a number.
    pub timestamp: i64,
    /// v1 signature (HMAC-SHA256).
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses an `x-signature` header string.
    ///
    /// Format: `ts=<timestamp>,v1=<signature>`
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::ParseError` if the header format is invalid.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut ts: Option<String> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key.trim() {
                "ts" => ts = Some(value.trim().to_string()),
                "v1" => {
                    v1_signature = Some(hex::decode(value.trim()).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {
                    // Ignore unknown fields for forward compatibility
                }
            }
        }

        let ts = ts.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        let timestamp = ts
            .parse()
            .map_err(|_| WebhookError::ParseError("invalid timestamp".to_string()))?;
        let v1_signature = v1_signature
            .ok_or_else(|| WebhookError::ParseError("missing v1 signature".to_string()))?;

        Ok(SignatureHeader {
            ts,
            timestamp,
            v1_signature,
        })
    }
}

/// Request parts taking part in the signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureInput<'a> {
    pub x_signature: Option<&'a str>,
    pub x_request_id: Option<&'a str>,
    /// `data.id` from the query string, else from the body.
    pub data_id: Option<&'a str>,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// No secret configured; the request was let through.
    Skipped,
}

/// Verifier for Mercado Pago webhook signatures.
pub struct MercadoPagoSignatureVerifier {
    secret: Option<SecretString>,
    /// Replay window in seconds. `None` disables the check.
    tolerance_secs: Option<i64>,
}

impl MercadoPagoSignatureVerifier {
    /// Creates a verifier. Without a secret every request passes with a warning.
    pub fn new(secret: Option<SecretString>) -> Self {
        Self {
            secret,
            tolerance_secs: None,
        }
    }

    /// Rejects signatures whose `ts` is further than `secs` from now.
    pub fn with_tolerance(mut self, secs: Option<i64>) -> Self {
        self.tolerance_secs = secs;
        self
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Verifies the signature of one notification.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` - header missing or HMAC mismatch
    /// - `TimestampOutOfRange` - outside the replay window
    /// - `ParseError` - malformed header
    pub fn verify(
        &self,
        input: SignatureInput<'_>,
        now: Timestamp,
    ) -> Result<Verification, WebhookError> {
        let Some(secret) = &self.secret else {
            tracing::warn!("Webhook secret not configured, skipping signature verification");
            return Ok(Verification::Skipped);
        };

        let raw = input.x_signature.ok_or(WebhookError::InvalidSignature)?;
        let header = SignatureHeader::parse(raw)?;

        self.validate_timestamp(header.timestamp, now)?;

        let manifest = build_manifest(input.data_id, input.x_request_id, &header.ts);
        let expected = compute_signature(secret.expose_secret(), &manifest)?;

        if !constant_time_compare(&expected, &header.v1_signature) {
            return Err(WebhookError::InvalidSignature);
        }

        Ok(Verification::Verified)
    }

    fn validate_timestamp(&self, timestamp: i64, now: Timestamp) -> Result<(), WebhookError> {
        let Some(tolerance) = self.tolerance_secs else {
            return Ok(());
        };

        let secs = if timestamp > MILLIS_THRESHOLD {
            timestamp / 1000
        } else {
            timestamp
        };

        if (now.as_unix_secs() - secs).abs() > tolerance {
            return Err(WebhookError::TimestampOutOfRange);
        }
        Ok(())
    }
}

/// Builds the signed manifest. Alphanumeric ids are lowercased.
pub fn build_manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id.filter(|s| !s.is_empty()) {
        let id = if id.chars().all(|c| c.is_ascii_alphanumeric()) {
            id.to_ascii_lowercase()
        } else {
            id.to_string()
        };
        manifest.push_str(&format!("id:{};", id));
    }
    if let Some(request_id) = request_id.filter(|s| !s.is_empty()) {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));
    manifest
}

fn compute_signature(secret: &str, manifest: &str) -> Result<Vec<u8>, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::ParseError(format!("invalid webhook secret: {}", e)))?;
    mac.update(manifest.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Computes an `x-signature` header value for test fixtures.
#[cfg(test)]
pub fn compute_test_signature(
    secret: &str,
    data_id: Option<&str>,
    request_id: Option<&str>,
    ts: i64,
) -> String {
    let manifest = build_manifest(data_id, request_id, &ts.to_string());
    let signature = compute_signature(secret, &manifest).unwrap();
    format!("ts={},v1={}", ts, hex::encode(signature))
}
