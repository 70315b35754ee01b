//! Mercado Pago API wire types.
//!
//! Only the fields the reconciler reads are modelled. Amounts arrive as decimal
//! reais and are converted to cents; timestamps arrive with a local offset and
//! are converted to UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::billing::PaymentMethod;
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    CheckoutPreferenceRequest, PaymentError, PreapprovalStatus, ProviderAuthorizedPayment,
    ProviderPayment, ProviderPaymentStatus, ProviderPreapproval,
};

/// Ids come back as numbers for payments and strings for preapprovals.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MpId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for MpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MpId::Number(n) => write!(f, "{}", n),
            MpId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpPayment {
    pub id: MpId,
    pub status: String,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub payment_type_id: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_approved: Option<String>,
    #[serde(default)]
    pub date_of_expiration: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpAutoRecurring {
    #[serde(default)]
    pub frequency: Option<i64>,
    #[serde(default)]
    pub frequency_type: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpPreapproval {
    pub id: MpId,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub auto_recurring: Option<MpAutoRecurring>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpAuthorizedPaymentDetail {
    #[serde(default)]
    pub id: Option<MpId>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpAuthorizedPayment {
    pub id: MpId,
    pub preapproval_id: String,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub debit_date: Option<String>,
    #[serde(default)]
    pub payment: Option<MpAuthorizedPaymentDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MpPreferenceItem {
    pub title: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub currency_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MpBackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MpPreferenceRequest {
    pub items: Vec<MpPreferenceItem>,
    pub external_reference: String,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub back_urls: Option<MpBackUrls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_return: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpPreferenceResponse {
    pub id: String,
    #[serde(default)]
    pub init_point: Option<String>,
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

/// Provider error body.
#[derive(Debug, Clone, Deserialize)]
pub struct MpErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub fn to_cents(amount: Option<f64>) -> i64 {
    amount.map(|a| (a * 100.0).round() as i64).unwrap_or(0)
}

pub fn to_reais(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub fn parse_timestamp(raw: Option<&str>) -> Option<Timestamp> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
}

/// Merges checkout metadata with whatever `external_reference` carries.
///
/// `external_reference` is either a JSON object (platform checkouts) or a bare
/// subscription id (reactivation checkouts). Explicit metadata keys win.
pub fn merge_metadata(metadata: Option<Value>, external_reference: Option<&str>) -> Value {
    let mut merged = match metadata {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    if let Some(reference) = external_reference.map(str::trim).filter(|s| !s.is_empty()) {
        match serde_json::from_str::<Value>(reference) {
            Ok(Value::Object(extra)) => {
                for (k, v) in extra {
                    merged.entry(k).or_insert(v);
                }
            }
            _ if reference.parse::<SubscriptionId>().is_ok() => {
                merged
                    .entry("subscription_id".to_string())
                    .or_insert_with(|| Value::String(reference.to_string()));
            }
            _ => {}
        }
    }

    Value::Object(merged)
}

impl MpPayment {
    pub fn into_provider(self) -> ProviderPayment {
        let method = self
            .payment_method_id
            .as_deref()
            .map(PaymentMethod::from_provider)
            .filter(|m| *m != PaymentMethod::Other)
            .or_else(|| self.payment_type_id.as_deref().map(PaymentMethod::from_provider))
            .unwrap_or(PaymentMethod::Other);

        ProviderPayment {
            id: self.id.to_string(),
            status: ProviderPaymentStatus::from_provider(&self.status),
            amount_cents: to_cents(self.transaction_amount),
            payment_method: method,
            date_created: parse_timestamp(self.date_created.as_deref()),
            date_approved: parse_timestamp(self.date_approved.as_deref()),
            date_of_expiration: parse_timestamp(self.date_of_expiration.as_deref()),
            metadata: merge_metadata(self.metadata, self.external_reference.as_deref()),
            external_reference: self.external_reference,
        }
    }
}

impl MpPreapproval {
    /// `date_created` is required: it anchors the accumulated period.
    pub fn into_provider(self) -> Result<ProviderPreapproval, PaymentError> {
        let id = self.id.to_string();
        let date_created = parse_timestamp(self.date_created.as_deref()).ok_or_else(|| {
            PaymentError::invalid_response(format!("Preapproval {} has no valid date_created", id))
        })?;

        let mut metadata = merge_metadata(self.metadata, self.external_reference.as_deref());
        if let (Value::Object(map), Some(recurring)) = (&mut metadata, &self.auto_recurring) {
            if recurring.frequency_type.as_deref() == Some("months") {
                if let Some(months) = recurring.frequency {
                    map.entry("months".to_string()).or_insert(Value::from(months));
                }
            }
        }

        Ok(ProviderPreapproval {
            id,
            status: PreapprovalStatus::from_provider(&self.status),
            reason: self.reason,
            amount_cents: to_cents(self.auto_recurring.as_ref().and_then(|r| r.transaction_amount)),
            date_created,
            metadata,
            external_reference: self.external_reference,
        })
    }
}

impl MpAuthorizedPayment {
    pub fn into_provider(self) -> ProviderAuthorizedPayment {
        let (payment_id, payment_status) = match self.payment {
            Some(detail) => (
                detail.id.map(|id| id.to_string()),
                detail
                    .status
                    .as_deref()
                    .map(ProviderPaymentStatus::from_provider)
                    .unwrap_or(ProviderPaymentStatus::Unknown),
            ),
            None => (None, ProviderPaymentStatus::Unknown),
        };

        ProviderAuthorizedPayment {
            id: self.id.to_string(),
            preapproval_id: self.preapproval_id,
            amount_cents: to_cents(self.transaction_amount),
            payment_status,
            payment_id,
            date_created: parse_timestamp(self.date_created.as_deref()),
            debit_date: parse_timestamp(self.debit_date.as_deref()),
        }
    }
}

impl MpPreferenceRequest {
    pub fn from_request(
        request: CheckoutPreferenceRequest,
        currency: &str,
        notification_url: Option<String>,
        back_url: Option<&str>,
    ) -> Self {
        Self {
            items: vec![MpPreferenceItem {
                title: request.title,
                quantity: 1,
                unit_price: to_reais(request.amount_cents),
                currency_id: currency.to_string(),
            }],
            external_reference: request.external_reference,
            metadata: request.metadata,
            notification_url,
            back_urls: back_url.map(|url| MpBackUrls {
                success: url.to_string(),
                failure: url.to_string(),
                pending: url.to_string(),
            }),
            auto_return: back_url.map(|_| "approved".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payment_converts_amount_method_and_dates() {
        let raw: MpPayment = serde_json::from_value(json!({
            "id": 123456789,
            "status": "approved",
            "transaction_amount": 49.9,
            "payment_method_id": "pix",
            "payment_type_id": "bank_transfer",
            "date_created": "2024-01-10T09:00:00.000-03:00",
            "date_approved": "2024-01-10T09:05:00.000-03:00",
            "metadata": {"user_id": "merchant-1", "months": 1}
        }))
        .unwrap();

        let payment = raw.into_provider();
        assert_eq!(payment.id, "123456789");
        assert!(payment.status.is_approved());
        assert_eq!(payment.amount_cents, 4990);
        assert_eq!(payment.payment_method, PaymentMethod::Pix);
        assert_eq!(
            payment.date_approved.unwrap().as_datetime().to_rfc3339(),
            "2024-01-10T12:05:00+00:00"
        );
    }

    #[test]
    fn card_type_used_when_method_id_is_a_brand() {
        let raw: MpPayment = serde_json::from_value(json!({
            "id": 1,
            "status": "approved",
            "payment_method_id": "visa",
            "payment_type_id": "credit_card"
        }))
        .unwrap();
        assert_eq!(raw.into_provider().payment_method, PaymentMethod::CreditCard);
    }

    #[test]
    fn json_external_reference_is_merged_into_metadata() {
        let merged = merge_metadata(
            Some(json!({"months": 6})),
            Some(r#"{"userId":"merchant-1","months":12,"type":"platform_subscription"}"#),
        );
        assert_eq!(merged["userId"], "merchant-1");
        assert_eq!(merged["months"], 6);
        assert_eq!(merged["type"], "platform_subscription");
    }

    #[test]
    fn uuid_external_reference_becomes_subscription_id() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        let merged = merge_metadata(None, Some(id));
        assert_eq!(merged["subscription_id"], id);
    }

    #[test]
    fn opaque_external_reference_is_ignored() {
        assert_eq!(merge_metadata(None, Some("order-17")), json!({}));
    }

    #[test]
    fn preapproval_without_date_created_is_rejected() {
        let raw: MpPreapproval =
            serde_json::from_value(json!({"id": "pre-1", "status": "authorized"})).unwrap();
        assert!(raw.into_provider().is_err());
    }

    #[test]
    fn preapproval_frequency_fills_months() {
        let raw: MpPreapproval = serde_json::from_value(json!({
            "id": "pre-1",
            "status": "authorized",
            "date_created": "2024-02-01T00:00:00.000-00:00",
            "external_reference": "{\"userId\":\"merchant-1\",\"type\":\"platform_subscription\"}",
            "auto_recurring": {"frequency": 6, "frequency_type": "months", "transaction_amount": 269.4}
        }))
        .unwrap();

        let pre = raw.into_provider().unwrap();
        assert_eq!(pre.status, PreapprovalStatus::Authorized);
        assert_eq!(pre.amount_cents, 26940);
        assert_eq!(pre.metadata["months"], 6);
    }

    #[test]
    fn authorized_payment_reads_nested_status() {
        let raw: MpAuthorizedPayment = serde_json::from_value(json!({
            "id": 7788,
            "preapproval_id": "pre-1",
            "transaction_amount": 49.9,
            "debit_date": "2024-03-01T10:00:00.000-03:00",
            "payment": {"id": 991, "status": "approved"}
        }))
        .unwrap();

        let ap = raw.into_provider();
        assert_eq!(ap.id, "7788");
        assert_eq!(ap.payment_id.as_deref(), Some("991"));
        assert!(ap.payment_status.is_approved());
    }

    #[test]
    fn preference_request_uses_reais_and_back_urls() {
        let request = MpPreferenceRequest::from_request(
            CheckoutPreferenceRequest {
                title: "Plano Ouro".to_string(),
                amount_cents: 9990,
                external_reference: "ref".to_string(),
                metadata: json!({"type": "subscription_reactivation"}),
            },
            "BRL",
            Some("https://api.example.com/webhooks/mercadopago".to_string()),
            Some("https://app.example.com/billing"),
        );

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["items"][0]["unit_price"], 99.9);
        assert_eq!(body["items"][0]["currency_id"], "BRL");
        assert_eq!(body["back_urls"]["success"], "https://app.example.com/billing");
        assert_eq!(body["auto_return"], "approved");
    }
}
