//! Postgres implementation of PointTransactionStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NewPointTransaction, PartnerType, PointTransaction, TransactionStatus};
use crate::ports::{PointTransactionStore, StoreError, StoreResult};

/// Postgres-backed point transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PointTransactionStore for PostgresTransactionRepository {
    async fn insert(&self, tx: &NewPointTransaction) -> StoreResult<PointTransaction> {
        let row = sqlx::query_as::<_, PointTransactionRow>(
            r#"
            INSERT INTO point_transactions (
                member_id, partner_id, partner_type, amount, points, transaction_time, status, history_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, member_id, partner_id, partner_type, amount, points, transaction_time, status
            "#,
        )
        .bind(&tx.member_id)
        .bind(&tx.partner_id)
        .bind(tx.partner_type.as_str())
        .bind(&tx.amount)
        .bind(&tx.points)
        .bind(tx.transaction_time)
        .bind(tx.status.as_str())
        .bind(tx.history_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.into_domain()
    }

    async fn find_by_history(&self, history_id: Uuid) -> StoreResult<Option<PointTransaction>> {
        let row = sqlx::query_as::<_, PointTransactionRow>(
            r#"
            SELECT id, member_id, partner_id, partner_type, amount, points, transaction_time, status
            FROM point_transactions
            WHERE history_id = $1
            "#,
        )
        .bind(history_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(PointTransactionRow::into_domain).transpose()
    }

    async fn find_by_member_between(
        &self,
        member_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<PointTransaction>> {
        let rows = sqlx::query_as::<_, PointTransactionRow>(
            r#"
            SELECT id, member_id, partner_id, partner_type, amount, points, transaction_time, status
            FROM point_transactions
            WHERE member_id = $1 AND transaction_time BETWEEN $2 AND $3
            ORDER BY transaction_time DESC
            "#,
        )
        .bind(member_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter().map(PointTransactionRow::into_domain).collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct PointTransactionRow {
    id: i64,
    member_id: String,
    partner_id: String,
    partner_type: String,
    amount: bigdecimal::BigDecimal,
    points: bigdecimal::BigDecimal,
    transaction_time: DateTime<Utc>,
    status: String,
}

impl PointTransactionRow {
    fn into_domain(self) -> StoreResult<PointTransaction> {
        Ok(PointTransaction {
            id: self.id,
            member_id: self.member_id,
            partner_id: self.partner_id,
            partner_type: self
                .partner_type
                .parse::<PartnerType>()
                .map_err(|e| StoreError::Query(e.to_string()))?,
            amount: self.amount,
            points: self.points,
            transaction_time: self.transaction_time,
            status: self.status.parse::<TransactionStatus>().map_err(StoreError::Query)?,
        })
    }
}
