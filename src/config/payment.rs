//! Payment configuration (Mercado Pago and PIX)

use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Payment provider configuration
#[derive(Clone, Deserialize)]
pub struct PaymentConfig {
    /// Mercado Pago access token (`APP_USR-...` or `TEST-...`)
    pub access_token: String,

    /// Shared secret for `x-signature` verification
    pub webhook_secret: Option<String>,

    /// Expected `x-webhook-token` on PIX notifications
    pub pix_webhook_token: Option<String>,

    /// Reject signatures older than this many seconds. Unset disables the check.
    pub signature_tolerance_secs: Option<i64>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Webhook URL sent with checkout preferences
    pub notification_url: Option<String>,

    /// Where the checkout redirects after payment
    pub back_url: Option<String>,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Provider request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl PaymentConfig {
    pub fn webhook_secret(&self) -> Option<SecretString> {
        non_empty(&self.webhook_secret).map(SecretString::new)
    }

    pub fn pix_webhook_token(&self) -> Option<SecretString> {
        non_empty(&self.pix_webhook_token).map(SecretString::new)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check if using Mercado Pago test credentials
    pub fn is_test_mode(&self) -> bool {
        self.access_token.starts_with("TEST-")
    }

    /// Validate payment configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.access_token.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__ACCESS_TOKEN"));
        }
        if !self.access_token.starts_with("APP_USR-") && !self.access_token.starts_with("TEST-") {
            return Err(ValidationError::InvalidAccessToken);
        }
        if !is_http_url(&self.api_base_url) {
            return Err(ValidationError::InvalidUrl("PAYMENT__API_BASE_URL"));
        }
        if let Some(url) = &self.notification_url {
            if !is_http_url(url) {
                return Err(ValidationError::InvalidUrl("PAYMENT__NOTIFICATION_URL"));
            }
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        // Unsigned webhooks are tolerated outside production only
        if *environment == Environment::Production && self.webhook_secret().is_none() {
            return Err(ValidationError::WebhookSecretRequired);
        }
        Ok(())
    }
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("access_token", &"[REDACTED]")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("pix_webhook_token", &self.pix_webhook_token.as_ref().map(|_| "[REDACTED]"))
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .field("api_base_url", &self.api_base_url)
            .field("notification_url", &self.notification_url)
            .field("back_url", &self.back_url)
            .field("currency", &self.currency)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            webhook_secret: None,
            pix_webhook_token: None,
            signature_tolerance_secs: None,
            api_base_url: default_api_base_url(),
            notification_url: None,
            back_url: None,
            currency: default_currency(),
            timeout_secs: default_timeout(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

fn default_api_base_url() -> String {
    "https://api.mercadopago.com".to_string()
}

fn default_currency() -> String {
    "BRL".to_string()
}

fn default_timeout() -> u64 {
    10
}
