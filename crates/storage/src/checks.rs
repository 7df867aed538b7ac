use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use domain_watch_core::types::{CheckRecord, DomainStatus};

use crate::to_rfc3339;

/// Repository for the append-only `domain_checks` history.
#[derive(Clone)]
pub struct CheckRepository {
    pool: SqlitePool,
}

impl CheckRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a check outcome and returns the new record id.
    pub async fn append(&self, record: &NewCheckRecord<'_>) -> Result<i64, CheckError> {
        let details = record.details.map(serde_json::to_string).transpose()?;
        let check_date = to_rfc3339(record.check_date);
        let row = sqlx::query(
            "INSERT INTO domain_checks (domain_id, status, check_date, details, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(record.domain_id)
        .bind(record.status.as_str())
        .bind(&check_date)
        .bind(details)
        .bind(&check_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }

    /// Returns the `limit` most recent records for a domain, newest first.
    pub async fn recent(&self, domain_id: i64, limit: u32) -> Result<Vec<CheckRecord>, CheckError> {
        self.page(domain_id, None, limit).await
    }

    /// Keyset-paginated history, newest first.
    ///
    /// `before` is the id of the last record of the previous page.
    pub async fn page(
        &self,
        domain_id: i64,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<CheckRecord>, CheckError> {
        let rows = sqlx::query_as::<_, CheckRow>(
            r#"
SELECT id, domain_id, status, check_date, details
  FROM domain_checks
 WHERE domain_id = ?1
   AND (?2 IS NULL
        OR (check_date, id) < (SELECT check_date, id FROM domain_checks WHERE id = ?2))
 ORDER BY check_date DESC, id DESC
 LIMIT ?3
            "#,
        )
        .bind(domain_id)
        .bind(before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CheckRow::into_domain).collect())
    }

    /// Status of the record immediately preceding `record_id` in the
    /// domain's history, if any.
    pub async fn status_before(
        &self,
        domain_id: i64,
        record_id: i64,
    ) -> Result<Option<DomainStatus>, CheckError> {
        let records = self.page(domain_id, Some(record_id), 1).await?;
        Ok(records.first().map(|record| record.status))
    }

    /// Deletes up to `limit` records older than `threshold`, returning the count.
    pub async fn delete_older_than_batch(
        &self,
        threshold: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM domain_checks WHERE id IN \
             (SELECT id FROM domain_checks WHERE check_date < ? ORDER BY id LIMIT ?)",
        )
        .bind(to_rfc3339(threshold))
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Payload required to append a check record.
pub struct NewCheckRecord<'a> {
    pub domain_id: i64,
    pub status: DomainStatus,
    pub check_date: DateTime<Utc>,
    pub details: Option<&'a Value>,
}

/// Errors produced by the check history repository.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to encode check details: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct CheckRow {
    id: i64,
    domain_id: i64,
    status: String,
    check_date: DateTime<Utc>,
    details: Option<String>,
}

impl CheckRow {
    fn into_domain(self) -> CheckRecord {
        CheckRecord {
            id: self.id,
            domain_id: self.domain_id,
            status: self.status.parse().unwrap_or(DomainStatus::Unknown),
            check_date: self.check_date,
            details: self
                .details
                .and_then(|raw| serde_json::from_str(&raw).ok()),
        }
    }
}
