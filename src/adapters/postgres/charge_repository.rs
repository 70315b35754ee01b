//! PostgreSQL implementation of ChargeRepository.
//!
//! The claim is a single conditional update:
//!
//! ```sql
//! UPDATE charges SET processed_at = $2, processed_for = $3
//! WHERE id = $1 AND processed_at IS NULL
//! RETURNING ...
//! ```
//!
//! Row-level locking makes exactly one concurrent caller see a returned row,
//! across every process sharing the database.

use crate::domain::billing::{
    Charge, ChargeStatus, Claimant, PaymentMethod, ProviderCharge, IGNORED_TAG,
};
use crate::domain::foundation::{ChargeId, DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::ChargeRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

const RETURNING_COLUMNS: &str = "id, owner_id, external_id, status, amount_cents, payment_method, \
     metadata, created_at, paid_at, processed_at, processed_for, applied_at";

/// Metadata names an order and no subscription. Mirrors `PaymentPurpose` decoding.
const IS_ORDER_PAYMENT: &str = "(\
     btrim(COALESCE(metadata->>'order_id', metadata->>'orderId', '')) <> '' \
     AND btrim(COALESCE(metadata->>'subscription_id', metadata->>'subscriptionId', '')) = '' \
     AND COALESCE(btrim(metadata->>'type'), '') \
         NOT IN ('platform_subscription', 'subscription_reactivation'))";

/// PostgreSQL implementation of the ChargeRepository port.
pub struct PostgresChargeRepository {
    pool: PgPool,
}

impl PostgresChargeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn require_exists(&self, id: &ChargeId) -> Result<(), DomainError> {
        match self.find_by_id(id).await? {
            Some(_) => Ok(()),
            None => Err(not_found(id)),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChargeRow {
    id: Uuid,
    owner_id: String,
    external_id: String,
    status: String,
    amount_cents: i64,
    payment_method: String,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    processed_for: Option<String>,
    applied_at: Option<DateTime<Utc>>,
}

impl TryFrom<ChargeRow> for Charge {
    type Error = DomainError;

    fn try_from(row: ChargeRow) -> Result<Self, Self::Error> {
        Ok(Charge {
            id: ChargeId::from_uuid(row.id),
            owner_id: UserId::new(row.owner_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid owner_id: {}", e))
            })?,
            external_id: row.external_id,
            status: row.status.parse().map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid charge status: {}", e))
            })?,
            amount_cents: row.amount_cents,
            payment_method: PaymentMethod::from_provider(&row.payment_method),
            metadata: row.metadata.unwrap_or(Value::Null),
            created_at: Timestamp::from_datetime(row.created_at),
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            processed_for: row.processed_for,
            applied_at: row.applied_at.map(Timestamp::from_datetime),
        })
    }
}

fn not_found(id: &ChargeId) -> DomainError {
    DomainError::new(ErrorCode::ChargeNotFound, format!("Charge {} not found", id))
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {} charge: {}", action, e))
}

#[async_trait]
impl ChargeRepository for PostgresChargeRepository {
    async fn insert(&self, charge: &Charge) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO charges (
                id, owner_id, external_id, status, amount_cents, payment_method,
                metadata, created_at, paid_at, processed_at, processed_for, applied_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(charge.id.as_uuid())
        .bind(charge.owner_id.as_str())
        .bind(&charge.external_id)
        .bind(charge.status.as_str())
        .bind(charge.amount_cents)
        .bind(charge.payment_method.as_str())
        .bind(&charge.metadata)
        .bind(charge.created_at.as_datetime())
        .bind(charge.paid_at.map(|t| *t.as_datetime()))
        .bind(charge.processed_at.map(|t| *t.as_datetime()))
        .bind(&charge.processed_for)
        .bind(charge.applied_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("charges_external_id_key") {
                    return DomainError::new(
                        ErrorCode::Conflict,
                        format!("Charge with external id {} already exists", charge.external_id),
                    );
                }
            }
            db_error("insert", e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ChargeId) -> Result<Option<Charge>, DomainError> {
        let row: Option<ChargeRow> =
            sqlx::query_as(&format!("SELECT {} FROM charges WHERE id = $1", RETURNING_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find", e))?;

        row.map(Charge::try_from).transpose()
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Charge>, DomainError> {
        let row: Option<ChargeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM charges WHERE external_id = $1",
            RETURNING_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find", e))?;

        row.map(Charge::try_from).transpose()
    }

    async fn record_paid(
        &self,
        charge: ProviderCharge,
        now: Timestamp,
    ) -> Result<Charge, DomainError> {
        let fresh = charge.into_charge(now);

        let row: ChargeRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO charges (
                id, owner_id, external_id, status, amount_cents, payment_method,
                metadata, created_at, paid_at
            ) VALUES ($1, $2, $3, 'paid', $4, $5, $6, $7, $8)
            ON CONFLICT (external_id) DO UPDATE SET
                status = 'paid',
                paid_at = COALESCE(charges.paid_at, EXCLUDED.paid_at)
            RETURNING {}
            "#,
            RETURNING_COLUMNS
        ))
        .bind(fresh.id.as_uuid())
        .bind(fresh.owner_id.as_str())
        .bind(&fresh.external_id)
        .bind(fresh.amount_cents)
        .bind(fresh.payment_method.as_str())
        .bind(&fresh.metadata)
        .bind(fresh.created_at.as_datetime())
        .bind(fresh.paid_at.map(|t| *t.as_datetime()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("record paid", e))?;

        Charge::try_from(row)
    }

    async fn mark_paid(
        &self,
        id: &ChargeId,
        paid_at: Timestamp,
    ) -> Result<Option<Charge>, DomainError> {
        let row: Option<ChargeRow> = sqlx::query_as(&format!(
            r#"
            UPDATE charges SET status = 'paid', paid_at = $2
            WHERE id = $1 AND status IN ('pending', 'expired')
            RETURNING {}
            "#,
            RETURNING_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(paid_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("mark paid", e))?;

        match row {
            Some(row) => Charge::try_from(row).map(Some),
            None => self.require_exists(id).await.map(|_| None),
        }
    }

    async fn mark_closed(&self, id: &ChargeId, status: ChargeStatus) -> Result<bool, DomainError> {
        if !matches!(status, ChargeStatus::Expired | ChargeStatus::Cancelled) {
            return Ok(false);
        }

        let result =
            sqlx::query("UPDATE charges SET status = $2 WHERE id = $1 AND status = 'pending'")
                .bind(id.as_uuid())
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("close", e))?;

        if result.rows_affected() == 0 {
            self.require_exists(id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn try_claim(
        &self,
        id: &ChargeId,
        claimant: Claimant,
        now: Timestamp,
    ) -> Result<Option<Charge>, DomainError> {
        let row: Option<ChargeRow> = sqlx::query_as(&format!(
            r#"
            UPDATE charges SET processed_at = $2, processed_for = $3
            WHERE id = $1 AND processed_at IS NULL
            RETURNING {}
            "#,
            RETURNING_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(now.as_datetime())
        .bind(claimant.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("claim", e))?;

        row.map(Charge::try_from).transpose()
    }

    async fn mark_ignored(&self, id: &ChargeId, now: Timestamp) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE charges SET processed_at = $2, processed_for = $3 \
             WHERE id = $1 AND processed_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(now.as_datetime())
        .bind(IGNORED_TAG)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("mark ignored", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_applied(&self, id: &ChargeId, now: Timestamp) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE charges SET applied_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(now.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("mark applied", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn list_paid_unprocessed(
        &self,
        owner_id: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError> {
        let rows: Vec<ChargeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM charges
            WHERE status = 'paid'
              AND processed_at IS NULL
              AND ($1::text IS NULL OR owner_id = $1)
              AND NOT {}
            ORDER BY paid_at ASC NULLS LAST, created_at ASC
            LIMIT $2
            "#,
            RETURNING_COLUMNS, IS_ORDER_PAYMENT
        ))
        .bind(owner_id.map(UserId::as_str))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list paid", e))?;

        rows.into_iter().map(Charge::try_from).collect()
    }

    async fn list_pending(
        &self,
        owner_id: Option<&UserId>,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError> {
        let rows: Vec<ChargeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM charges
            WHERE status = 'pending'
              AND ($1::text IS NULL OR owner_id = $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
            RETURNING_COLUMNS
        ))
        .bind(owner_id.map(UserId::as_str))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list pending", e))?;

        rows.into_iter().map(Charge::try_from).collect()
    }

    async fn list_stalled(
        &self,
        claimed_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<Charge>, DomainError> {
        let rows: Vec<ChargeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM charges
            WHERE processed_at IS NOT NULL
              AND applied_at IS NULL
              AND processed_for IS DISTINCT FROM '{}'
              AND processed_at < $1
            ORDER BY processed_at ASC
            LIMIT $2
            "#,
            RETURNING_COLUMNS, IGNORED_TAG
        ))
        .bind(claimed_before.as_datetime())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list stalled", e))?;

        rows.into_iter().map(Charge::try_from).collect()
    }
}
