//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Rows are read without checking scope consistency; callers narrow them
//! through the integrity check so corrupt rows surface as errors there.

use crate::domain::billing::{BillingTerm, SubscriptionCore, SubscriptionRecord, SubscriptionStatus};
use crate::domain::foundation::{
    CustomerId, DomainError, ErrorCode, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::SubscriptionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    SELECT id, owner_id, customer_id, plan_id, status, plan_label, amount_cents,
           billing_term, start_date, last_billing_date, next_billing_date,
           failed_payments_count, created_at, updated_at, cancelled_at
    FROM subscriptions
"#;

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    owner_id: String,
    customer_id: Option<Uuid>,
    plan_id: Option<Uuid>,
    status: String,
    plan_label: String,
    amount_cents: i64,
    billing_term: String,
    start_date: DateTime<Utc>,
    last_billing_date: Option<DateTime<Utc>>,
    next_billing_date: Option<DateTime<Utc>>,
    failed_payments_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row.status.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid status value: {}", e))
        })?;
        let billing_term = parse_term(&row.billing_term)?;

        Ok(SubscriptionRecord {
            customer_id: row.customer_id.map(CustomerId::from_uuid),
            plan_id: row.plan_id.map(PlanId::from_uuid),
            core: SubscriptionCore {
                id: SubscriptionId::from_uuid(row.id),
                owner_id: UserId::new(row.owner_id).map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Invalid owner_id: {}", e))
                })?,
                status,
                plan_label: row.plan_label,
                amount_cents: row.amount_cents,
                billing_term,
                start_date: Timestamp::from_datetime(row.start_date),
                last_billing_date: row.last_billing_date.map(Timestamp::from_datetime),
                next_billing_date: row.next_billing_date.map(Timestamp::from_datetime),
                failed_payments_count: row.failed_payments_count,
                created_at: Timestamp::from_datetime(row.created_at),
                updated_at: Timestamp::from_datetime(row.updated_at),
                cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            },
        })
    }
}

fn parse_term(s: &str) -> Result<BillingTerm, DomainError> {
    BillingTerm::from_label(s).ok_or_else(|| {
        DomainError::new(ErrorCode::DatabaseError, format!("Invalid billing_term value: {}", s))
    })
}

fn db_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {} subscription: {}", action, e))
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let core = &record.core;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, owner_id, customer_id, plan_id, status, plan_label, amount_cents,
                billing_term, start_date, last_billing_date, next_billing_date,
                failed_payments_count, created_at, updated_at, cancelled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(core.id.as_uuid())
        .bind(core.owner_id.as_str())
        .bind(record.customer_id.map(|c| *c.as_uuid()))
        .bind(record.plan_id.map(|p| *p.as_uuid()))
        .bind(core.status.as_str())
        .bind(&core.plan_label)
        .bind(core.amount_cents)
        .bind(core.billing_term.as_str())
        .bind(core.start_date.as_datetime())
        .bind(core.last_billing_date.map(|t| *t.as_datetime()))
        .bind(core.next_billing_date.map(|t| *t.as_datetime()))
        .bind(core.failed_payments_count)
        .bind(core.created_at.as_datetime())
        .bind(core.updated_at.as_datetime())
        .bind(core.cancelled_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_pkey") {
                    return DomainError::new(
                        ErrorCode::Conflict,
                        format!("Subscription {} already exists", core.id),
                    );
                }
            }
            db_error("insert", e)
        })?;

        Ok(())
    }

    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
        let core = &record.core;

        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $2,
                plan_label = $3,
                amount_cents = $4,
                billing_term = $5,
                last_billing_date = $6,
                next_billing_date = $7,
                failed_payments_count = $8,
                updated_at = $9,
                cancelled_at = $10
            WHERE id = $1
            "#,
        )
        .bind(core.id.as_uuid())
        .bind(core.status.as_str())
        .bind(&core.plan_label)
        .bind(core.amount_cents)
        .bind(core.billing_term.as_str())
        .bind(core.last_billing_date.map(|t| *t.as_datetime()))
        .bind(core.next_billing_date.map(|t| *t.as_datetime()))
        .bind(core.failed_payments_count)
        .bind(core.updated_at.as_datetime())
        .bind(core.cancelled_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("Subscription {} not found", core.id),
            ));
        }

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find", e))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_by_id_for_owner(
        &self,
        id: &SubscriptionId,
        owner_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1 AND owner_id = $2", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .bind(owner_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find", e))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn find_latest_platform(
        &self,
        owner_id: &UserId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE owner_id = $1 AND customer_id IS NULL ORDER BY created_at DESC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(owner_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find", e))?;

        row.map(SubscriptionRecord::try_from).transpose()
    }
}
