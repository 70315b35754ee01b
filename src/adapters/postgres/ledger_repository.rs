//! PostgreSQL implementation of LedgerRepository.

use crate::domain::billing::{LedgerEntry, LedgerEntryStatus, NewLedgerEntry, PaymentMethod};
use crate::domain::foundation::{
    DomainError, ErrorCode, LedgerEntryId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::LedgerRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    user_id: String,
    subscription_id: Option<Uuid>,
    amount_cents: i64,
    description: String,
    payment_method: String,
    status: String,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DomainError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "completed" => LedgerEntryStatus::Completed,
            other => {
                return Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Invalid ledger status value: {}", other),
                ))
            }
        };

        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            amount_cents: row.amount_cents,
            description: row.description,
            payment_method: PaymentMethod::from_provider(&row.payment_method),
            status,
            occurred_at: Timestamp::from_datetime(row.occurred_at),
        })
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn exists_duplicate(&self, entry: &NewLedgerEntry) -> Result<bool, DomainError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM ledger_entries
                WHERE user_id = $1
                  AND amount_cents = $2
                  AND description = $3
                  AND payment_method = $4
                  AND status = $5
                  AND (occurred_at AT TIME ZONE 'UTC')::date = ($6 AT TIME ZONE 'UTC')::date
            )
            "#,
        )
        .bind(entry.user_id.as_str())
        .bind(entry.amount_cents)
        .bind(&entry.description)
        .bind(entry.payment_method.as_str())
        .bind(entry.status.as_str())
        .bind(entry.occurred_at.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to check ledger duplicate: {}", e)))?;

        Ok(exists)
    }

    async fn insert(&self, entry: NewLedgerEntry) -> Result<LedgerEntry, DomainError> {
        let stored = LedgerEntry::from_new(LedgerEntryId::new(), entry);

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, user_id, subscription_id, amount_cents, description,
                payment_method, status, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.user_id.as_str())
        .bind(stored.subscription_id.map(|s| *s.as_uuid()))
        .bind(stored.amount_cents)
        .bind(&stored.description)
        .bind(stored.payment_method.as_str())
        .bind(stored.status.as_str())
        .bind(stored.occurred_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to insert ledger entry: {}", e)))?;

        Ok(stored)
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, subscription_id, amount_cents, description,
                   payment_method, status, occurred_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY occurred_at DESC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list ledger entries: {}", e)))?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}
