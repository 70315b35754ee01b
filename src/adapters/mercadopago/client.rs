//! Mercado Pago REST adapter.
//!
//! Implements the `PaymentGateway` port against the Mercado Pago API.
//! Authenticates with a bearer access token held as a `SecretString`.
//!
//! # Configuration
//!
//! ```ignore
//! let config = MercadoPagoConfig::new(access_token)
//!     .with_notification_url("https://api.example.com/webhooks/mercadopago");
//! let gateway = MercadoPagoGateway::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::ports::{
    CheckoutPreference, CheckoutPreferenceRequest, PaymentError, PaymentErrorCode, PaymentGateway,
    ProviderAuthorizedPayment, ProviderPayment, ProviderPreapproval,
};

use super::api_types::{
    MpAuthorizedPayment, MpErrorBody, MpPayment, MpPreapproval, MpPreferenceRequest,
    MpPreferenceResponse,
};

const DEFAULT_API_BASE_URL: &str = "https://api.mercadopago.com";

/// Mercado Pago API configuration.
#[derive(Clone)]
pub struct MercadoPagoConfig {
    access_token: SecretString,

    /// Base URL for the API (default: https://api.mercadopago.com).
    api_base_url: String,

    /// Where the provider posts notifications for created preferences.
    notification_url: Option<String>,

    /// Where the payer returns after checkout.
    back_url: Option<String>,

    currency: String,

    timeout: Duration,
}

impl MercadoPagoConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            notification_url: None,
            back_url: None,
            currency: "BRL".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_notification_url(mut self, url: impl Into<String>) -> Self {
        self.notification_url = Some(url.into());
        self
    }

    pub fn with_back_url(mut self, url: impl Into<String>) -> Self {
        self.back_url = Some(url.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }
}

impl std::fmt::Debug for MercadoPagoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoConfig")
            .field("access_token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("notification_url", &self.notification_url)
            .field("back_url", &self.back_url)
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Mercado Pago gateway.
pub struct MercadoPagoGateway {
    config: MercadoPagoConfig,
    http_client: reqwest::Client,
}

impl MercadoPagoGateway {
    pub fn new(config: MercadoPagoConfig) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, http_client })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &str,
    ) -> Result<T, PaymentError> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        Self::decode(response, resource).await
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        resource: &str,
    ) -> Result<T, PaymentError> {
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::not_found(resource));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        response.json().await.map_err(|e| {
            PaymentError::invalid_response(format!("Failed to parse {} response: {}", resource, e))
        })
    }
}

/// Map a non-success status to a payment error.
fn status_error(status: reqwest::StatusCode, body: &str) -> PaymentError {
    let detail = serde_json::from_str::<MpErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| body.to_string());

    let code = match status.as_u16() {
        401 | 403 => PaymentErrorCode::AuthenticationError,
        429 => PaymentErrorCode::RateLimitExceeded,
        400 | 422 => PaymentErrorCode::InvalidRequest,
        s if s >= 500 => PaymentErrorCode::ProviderError,
        _ => PaymentErrorCode::Unknown,
    };

    PaymentError::new(code, format!("Mercado Pago API error ({}): {}", status.as_u16(), detail))
        .with_provider_code(status.as_u16().to_string())
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment, PaymentError> {
        let raw: MpPayment = self
            .get_json(&format!("/v1/payments/{}", payment_id), "Payment")
            .await?;
        Ok(raw.into_provider())
    }

    async fn get_preapproval(
        &self,
        preapproval_id: &str,
    ) -> Result<ProviderPreapproval, PaymentError> {
        let raw: MpPreapproval = self
            .get_json(&format!("/preapproval/{}", preapproval_id), "Preapproval")
            .await?;
        raw.into_provider()
    }

    async fn get_authorized_payment(
        &self,
        authorized_payment_id: &str,
    ) -> Result<ProviderAuthorizedPayment, PaymentError> {
        let raw: MpAuthorizedPayment = self
            .get_json(
                &format!("/authorized_payments/{}", authorized_payment_id),
                "Authorized payment",
            )
            .await?;
        Ok(raw.into_provider())
    }

    async fn create_checkout_preference(
        &self,
        request: CheckoutPreferenceRequest,
    ) -> Result<CheckoutPreference, PaymentError> {
        let url = format!("{}/checkout/preferences", self.config.api_base_url);
        let body = MpPreferenceRequest::from_request(
            request,
            &self.config.currency,
            self.config.notification_url.clone(),
            self.config.back_url.as_deref(),
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        let created: MpPreferenceResponse = Self::decode(response, "Checkout preference").await?;

        let init_point = created
            .init_point
            .or(created.sandbox_init_point)
            .ok_or_else(|| {
                PaymentError::invalid_response("Checkout preference has no init_point")
            })?;

        tracing::info!(preference_id = %created.id, "Checkout preference created");

        Ok(CheckoutPreference {
            id: created.id,
            init_point,
        })
    }
}
