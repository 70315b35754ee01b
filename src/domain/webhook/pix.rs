//! PIX notification payload (BACEN webhook format).

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::foundation::Timestamp;

use super::WebhookError;

/// `POST /webhooks/pix` body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PixNotification {
    #[serde(default)]
    pub pix: Vec<PixPayment>,
}

/// One settled PIX transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct PixPayment {
    /// Charge identifier issued with the QR code.
    #[serde(default)]
    pub txid: Option<String>,

    #[serde(rename = "endToEndId", default)]
    pub end_to_end_id: Option<String>,

    /// Amount as a decimal string, e.g. `"49.90"`.
    #[serde(default)]
    pub valor: Option<String>,

    /// Settlement time, RFC 3339.
    #[serde(default)]
    pub horario: Option<String>,
}

impl PixNotification {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|e| WebhookError::ParseError(e.to_string()))
    }
}

impl PixPayment {
    /// Trimmed txid, if any.
    pub fn txid(&self) -> Option<&str> {
        self.txid.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Settlement time, falling back to `received_at` when absent or unparseable.
    pub fn paid_at(&self, received_at: Timestamp) -> Timestamp {
        self.horario
            .as_deref()
            .and_then(|h| DateTime::parse_from_rfc3339(h).ok())
            .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
            .unwrap_or(received_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bacen_payload() {
        let body = br#"{"pix":[{"endToEndId":"E123","txid":"tx-1","valor":"49.90","horario":"2024-03-01T12:00:00.000-03:00"}]}"#;
        let notification = PixNotification::parse(body).unwrap();

        assert_eq!(notification.pix.len(), 1);
        let payment = &notification.pix[0];
        assert_eq!(payment.txid(), Some("tx-1"));
        assert_eq!(
            payment.paid_at(Timestamp::now()).as_datetime().to_rfc3339(),
            "2024-03-01T15:00:00+00:00"
        );
    }

    #[test]
    fn missing_horario_falls_back_to_receipt_time() {
        let payment = PixPayment {
            txid: Some(" tx ".to_string()),
            end_to_end_id: None,
            valor: None,
            horario: Some("yesterday".to_string()),
        };
        let received = Timestamp::from_ymd(2024, 3, 1).unwrap();

        assert_eq!(payment.paid_at(received), received);
        assert_eq!(payment.txid(), Some("tx"));
    }

    #[test]
    fn empty_object_has_no_payments() {
        assert!(PixNotification::parse(b"{}").unwrap().pix.is_empty());
    }
}
