//! HandlePixWebhookHandler - PIX settlement notifications.
//!
//! The PSP posts `{ "pix": [{ "txid", "horario", ... }] }` when QR charges are
//! paid. Each txid marks its pending charge paid and settles it. Unknown txids
//! are acknowledged.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::billing::{Charge, ChargeStatus, Claimant};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::webhook::{PixNotification, PixPayment, WebhookError};
use crate::ports::ChargeRepository;

use super::settle_charge::{ChargeSettler, SettlementOutcome};

/// Command to handle one PIX notification.
#[derive(Debug, Clone, Default)]
pub struct HandlePixWebhookCommand {
    pub body: Vec<u8>,
    /// `x-webhook-token` header.
    pub token: Option<String>,
}

/// Per-notification tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixWebhookResult {
    pub settled: usize,
    pub already_processed: usize,
    pub ignored: usize,
}

pub struct HandlePixWebhookHandler {
    token: Option<SecretString>,
    charges: Arc<dyn ChargeRepository>,
    settler: Arc<ChargeSettler>,
}

impl HandlePixWebhookHandler {
    pub fn new(
        token: Option<SecretString>,
        charges: Arc<dyn ChargeRepository>,
        settler: Arc<ChargeSettler>,
    ) -> Self {
        Self {
            token,
            charges,
            settler,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandlePixWebhookCommand,
    ) -> Result<PixWebhookResult, WebhookError> {
        self.check_token(cmd.token.as_deref())?;

        let now = Timestamp::now();
        let notification = PixNotification::parse(&cmd.body)?;
        let mut result = PixWebhookResult::default();

        for pix in &notification.pix {
            let Some(charge) = self.mark_paid(pix, now).await? else {
                result.ignored += 1;
                continue;
            };

            match self.settler.settle(&charge, Claimant::PixWebhook, now).await? {
                SettlementOutcome::Applied { .. } => result.settled += 1,
                SettlementOutcome::AlreadyClaimed { .. } => result.already_processed += 1,
                SettlementOutcome::Skipped { .. } => result.ignored += 1,
            }
        }

        tracing::info!(
            received = notification.pix.len(),
            settled = result.settled,
            already_processed = result.already_processed,
            ignored = result.ignored,
            "PIX notification processed"
        );

        Ok(result)
    }

    fn check_token(&self, provided: Option<&str>) -> Result<(), WebhookError> {
        let Some(expected) = &self.token else {
            return Ok(());
        };

        let provided = provided.ok_or(WebhookError::InvalidToken)?;
        if !tokens_match(expected.expose_secret(), provided) {
            tracing::warn!("PIX webhook token mismatch");
            return Err(WebhookError::InvalidToken);
        }
        Ok(())
    }

    /// Returns the paid charge for `pix`, or `None` when there is nothing to settle.
    async fn mark_paid(
        &self,
        pix: &PixPayment,
        now: Timestamp,
    ) -> Result<Option<Charge>, WebhookError> {
        let Some(txid) = pix.txid() else {
            tracing::warn!(end_to_end_id = ?pix.end_to_end_id, "PIX entry without txid");
            return Ok(None);
        };

        let found = self.charges.find_by_external_id(txid).await.map_err(storage_error)?;
        let Some(charge) = found else {
            tracing::info!(txid, "PIX txid does not match any charge, acknowledging");
            return Ok(None);
        };

        match charge.status {
            ChargeStatus::Paid => Ok(Some(charge)),
            ChargeStatus::Pending | ChargeStatus::Expired => {
                let updated = self
                    .charges
                    .mark_paid(&charge.id, pix.paid_at(now))
                    .await
                    .map_err(storage_error)?;
                match updated {
                    Some(paid) => Ok(Some(paid)),
                    // Lost a race with another writer; read back what it stored
                    None => self.charges.find_by_id(&charge.id).await.map_err(storage_error),
                }
            }
            ChargeStatus::Cancelled => {
                tracing::warn!(
                    txid,
                    charge_id = %charge.id,
                    "PIX payment received for a cancelled charge"
                );
                Ok(None)
            }
        }
    }
}

fn storage_error(e: DomainError) -> WebhookError {
    WebhookError::Database(e.to_string())
}

/// Constant-time comparison over SHA-256 digests of both tokens.
fn tokens_match(expected: &str, provided: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let provided = Sha256::digest(provided.as_bytes());
    expected.as_slice().ct_eq(provided.as_slice()).into()
}
