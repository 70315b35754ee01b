//! Mercado Pago notification envelope and shape dispatch.

use serde::Deserialize;
use serde_json::Value;

use super::WebhookError;

/// Notification body. Every field is optional; unknown shapes are acknowledged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<EnvelopeData>,
    #[serde(default)]
    pub live_mode: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeData {
    #[serde(default)]
    pub id: Option<Value>,
}

/// Query string the provider appends to the notification URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "data.id", default)]
    pub data_id: Option<String>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    /// Legacy IPN spelling of `type`.
    #[serde(default)]
    pub topic: Option<String>,
    /// Legacy IPN spelling of `data.id`.
    #[serde(default)]
    pub id: Option<String>,
}

/// What a notification asks us to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Recurring mandate created or updated.
    Preapproval { id: String },
    /// One charge of a recurring mandate.
    AuthorizedPayment { id: String },
    /// One-shot PIX or card capture.
    Payment { id: String },
    /// Anything else. Acknowledged without mutation.
    Unmatched {
        event_type: Option<String>,
        action: Option<String>,
    },
}

impl WebhookEnvelope {
    /// Parses a body. An empty body is an empty envelope.
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))
    }

    /// `data.id` from the body.
    pub fn data_id(&self) -> Option<String> {
        self.data.as_ref().and_then(|d| d.id.as_ref()).and_then(id_string)
    }
}

impl WebhookQuery {
    fn data_id(&self) -> Option<String> {
        self.data_id
            .clone()
            .or_else(|| self.id.clone())
            .filter(|s| !s.trim().is_empty())
    }

    fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref().or(self.topic.as_deref())
    }
}

/// Resource id used in the signature manifest: query first, then body.
pub fn signed_data_id(envelope: &WebhookEnvelope, query: &WebhookQuery) -> Option<String> {
    query.data_id().or_else(|| envelope.data_id())
}

/// Dispatches on the envelope shape.
///
/// # Errors
///
/// `MissingField("data.id")` when a recognised shape carries no resource id.
pub fn classify(
    envelope: &WebhookEnvelope,
    query: &WebhookQuery,
) -> Result<WebhookEvent, WebhookError> {
    let event_type = envelope.event_type.as_deref().or_else(|| query.event_type());
    let action = envelope.action.as_deref();

    let resource_id = || {
        signed_data_id(envelope, query).ok_or(WebhookError::MissingField("data.id"))
    };

    match (event_type, action) {
        (Some("subscription_preapproval"), _) | (Some("preapproval"), _) => {
            Ok(WebhookEvent::Preapproval { id: resource_id()? })
        }
        (Some("subscription_authorized_payment"), _) | (Some("authorized_payment"), _) => {
            Ok(WebhookEvent::AuthorizedPayment { id: resource_id()? })
        }
        (_, Some("payment.created")) | (_, Some("payment.updated")) | (Some("payment"), _) => {
            Ok(WebhookEvent::Payment { id: resource_id()? })
        }
        _ => Ok(WebhookEvent::Unmatched {
            event_type: event_type.map(str::to_string),
            action: action.map(str::to_string),
        }),
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
