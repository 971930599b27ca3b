//! Postgres implementation of PointHistoryStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{HistoryStatus, PointHistory};
use crate::ports::{PointHistoryStore, StoreError, StoreResult};

const COLUMNS: &str = "id, source_event_id, member_id, partner_id, partner_type, amount, points, \
     transaction_time, status, retry_count, error_message, last_retry_time";

#[derive(Clone)]
pub struct PostgresHistoryRepository {
    pool: PgPool,
}

impl PostgresHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PointHistoryStore for PostgresHistoryRepository {
    async fn insert(&self, entry: &PointHistory) -> StoreResult<PointHistory> {
        let sql = format!(
            r#"
            INSERT INTO point_history (
                id, source_event_id, member_id, partner_id, partner_type, amount, points,
                transaction_time, status, retry_count, error_message, last_retry_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PointHistoryRow>(&sql)
            .bind(entry.id)
            .bind(&entry.source_event_id)
            .bind(&entry.member_id)
            .bind(&entry.partner_id)
            .bind(&entry.partner_type)
            .bind(&entry.amount)
            .bind(&entry.points)
            .bind(entry.transaction_time)
            .bind(entry.status.as_str())
            .bind(entry.retry_count)
            .bind(&entry.error_message)
            .bind(entry.last_retry_time)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;

        row.into_domain()
    }

    async fn get(&self, id: Uuid) -> StoreResult<PointHistory> {
        let sql = format!("SELECT {COLUMNS} FROM point_history WHERE id = $1");
        let row = sqlx::query_as::<_, PointHistoryRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        row.ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn find_by_source_event(&self, event_id: &str) -> StoreResult<Option<PointHistory>> {
        let sql = format!("SELECT {COLUMNS} FROM point_history WHERE source_event_id = $1");
        let row = sqlx::query_as::<_, PointHistoryRow>(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        row.map(PointHistoryRow::into_domain).transpose()
    }

    async fn find_retryable(
        &self,
        ceiling: i32,
        pending_before: DateTime<Utc>,
    ) -> StoreResult<Vec<PointHistory>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM point_history
            WHERE retry_count < $1
              AND (status = 'FAILED' OR (status = 'PENDING' AND transaction_time <= $2))
            ORDER BY transaction_time ASC
            "#
        );
        let rows = sqlx::query_as::<_, PointHistoryRow>(&sql)
            .bind(ceiling)
            .bind(pending_before)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        rows.into_iter().map(PointHistoryRow::into_domain).collect()
    }

    async fn update_if_retryable(
        &self,
        updated: &PointHistory,
        expected_retry_count: i32,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE point_history
            SET status = $1, points = $2, retry_count = $3, error_message = $4, last_retry_time = $5
            WHERE id = $6 AND retry_count = $7 AND status IN ('PENDING', 'FAILED')
            "#,
        )
        .bind(updated.status.as_str())
        .bind(&updated.points)
        .bind(updated.retry_count)
        .bind(&updated.error_message)
        .bind(updated.last_retry_time)
        .bind(updated.id)
        .bind(expected_retry_count)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, status: Option<HistoryStatus>, limit: i64) -> StoreResult<Vec<PointHistory>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM point_history
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY transaction_time DESC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, PointHistoryRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        rows.into_iter().map(PointHistoryRow::into_domain).collect()
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
struct PointHistoryRow {
    id: Uuid,
    source_event_id: Option<String>,
    member_id: String,
    partner_id: String,
    partner_type: String,
    amount: bigdecimal::BigDecimal,
    points: Option<bigdecimal::BigDecimal>,
    transaction_time: DateTime<Utc>,
    status: String,
    retry_count: i32,
    error_message: Option<String>,
    last_retry_time: Option<DateTime<Utc>>,
}

impl PointHistoryRow {
    fn into_domain(self) -> StoreResult<PointHistory> {
        Ok(PointHistory {
            id: self.id,
            source_event_id: self.source_event_id,
            member_id: self.member_id,
            partner_id: self.partner_id,
            partner_type: self.partner_type,
            amount: self.amount,
            points: self.points,
            transaction_time: self.transaction_time,
            status: self.status.parse::<HistoryStatus>().map_err(StoreError::Query)?,
            retry_count: self.retry_count,
            error_message: self.error_message,
            last_retry_time: self.last_retry_time,
        })
    }
}
