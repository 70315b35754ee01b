//! Data Transfer Objects for the HTTP API.
//!
//! Request and response shapes kept apart from domain types so the wire
//! format can evolve independently.

use serde::Serialize;

use crate::application::handlers::billing::{PixWebhookResult, SweepReport, WebhookOutcome};

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Responses
// ════════════════════════════════════════════════════════════════════════════════

/// Body returned to the provider for a handled notification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookAckResponse {
    pub received: bool,
    /// `settled`, `already_processed` or `acknowledged`.
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<WebhookOutcome> for WebhookAckResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        match outcome {
            WebhookOutcome::Settled { charge_id, .. } => Self {
                received: true,
                result: "settled",
                charge_id: Some(charge_id.to_string()),
                reason: None,
            },
            WebhookOutcome::AlreadyProcessed { charge_id } => Self {
                received: true,
                result: "already_processed",
                charge_id: Some(charge_id.to_string()),
                reason: None,
            },
            WebhookOutcome::Acknowledged { reason } => Self {
                received: true,
                result: "acknowledged",
                charge_id: None,
                reason: Some(reason),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PixWebhookResponse {
    pub received: bool,
    pub settled: usize,
    pub already_processed: usize,
    pub ignored: usize,
}

impl From<PixWebhookResult> for PixWebhookResponse {
    fn from(result: PixWebhookResult) -> Self {
        Self {
            received: true,
            settled: result.settled,
            already_processed: result.already_processed,
            ignored: result.ignored,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription Responses
// ════════════════════════════════════════════════════════════════════════════════

/// Response for starting a reactivation checkout.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReactivateResponse {
    pub payment_url: String,
    pub preference_id: String,
}

/// Response for an owner-scoped sweep.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckPendingResponse {
    pub processed: usize,
    pub total_paid: usize,
    pub total_eligible: usize,
}

impl From<&SweepReport> for CheckPendingResponse {
    fn from(report: &SweepReport) -> Self {
        Self {
            processed: report.processed.len(),
            total_paid: report.total_paid,
            total_eligible: report.total_eligible,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
