use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

use domain_watch_core::types::{DomainStatus, WatchedDomain};

use crate::{is_unique_violation, to_rfc3339};

const DOMAIN_COLUMNS: &str = "id, user_id, domain, status, last_checked, notify_if_available, \
                              notes, created_at, updated_at";

/// Repository for the `domains` table (the per-user watchlist).
#[derive(Clone)]
pub struct DomainRepository {
    pool: SqlitePool,
}

impl DomainRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Adds a domain to a user's watchlist with status `pending`.
    ///
    /// Returns [`DomainError::Duplicate`] when the user already watches the name.
    pub async fn insert(&self, record: &NewWatchedDomain<'_>) -> Result<WatchedDomain, DomainError> {
        let created_at = to_rfc3339(record.created_at);
        let sql = format!(
            "INSERT INTO domains \
             (user_id, domain, status, last_checked, notify_if_available, notes, created_at, updated_at) \
             VALUES (?, ?, 'pending', NULL, ?, ?, ?, ?) \
             RETURNING {DOMAIN_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DomainRow>(&sql)
            .bind(record.user_id)
            .bind(record.domain)
            .bind(i64::from(record.notify_if_available))
            .bind(record.notes)
            .bind(&created_at)
            .bind(&created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    DomainError::Duplicate
                } else {
                    DomainError::Database(err)
                }
            })?;

        Ok(row.into_domain())
    }

    /// Lists a user's domains, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<WatchedDomain>, DomainError> {
        let sql = format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, DomainRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(DomainRow::into_domain).collect())
    }

    /// Loads one domain owned by `user_id`.
    pub async fn fetch_for_user(&self, id: i64, user_id: &str) -> Result<WatchedDomain, DomainError> {
        let sql = format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE id = ? AND user_id = ?");
        sqlx::query_as::<_, DomainRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(DomainRow::into_domain)
            .ok_or(DomainError::NotFound)
    }

    /// Finds the first row (lowest id) watching `domain`, across all users.
    pub async fn find_first_by_name(&self, domain: &str) -> Result<Option<WatchedDomain>, DomainError> {
        let sql =
            format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE domain = ? ORDER BY id ASC LIMIT 1");
        let row = sqlx::query_as::<_, DomainRow>(&sql)
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DomainRow::into_domain))
    }

    /// Finds `domain` on one user's watchlist.
    pub async fn find_for_user_by_name(
        &self,
        user_id: &str,
        domain: &str,
    ) -> Result<Option<WatchedDomain>, DomainError> {
        let sql = format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE user_id = ? AND domain = ?");
        let row = sqlx::query_as::<_, DomainRow>(&sql)
            .bind(user_id)
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DomainRow::into_domain))
    }

    /// Returns up to `limit` domains due for a check.
    ///
    /// Never-checked domains come first, then the least recently checked;
    /// ties keep insertion order.
    pub async fn list_due(&self, limit: u32) -> Result<Vec<WatchedDomain>, DomainError> {
        let sql = format!(
            "SELECT {DOMAIN_COLUMNS} FROM domains \
             ORDER BY (last_checked IS NOT NULL) ASC, last_checked ASC, id ASC \
             LIMIT ?"
        );
        let rows = sqlx::query_as::<_, DomainRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(DomainRow::into_domain).collect())
    }

    /// Stores the outcome of a check on the domain row.
    ///
    /// Scoped by `(id, user_id)`; returns `false` when no row matched.
    pub async fn record_status(
        &self,
        id: i64,
        user_id: &str,
        status: DomainStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let checked_at = to_rfc3339(checked_at);
        let result = sqlx::query(
            "UPDATE domains SET status = ?, last_checked = ?, updated_at = ? \
             WHERE id = ? AND user_id = ?",
        )
        .bind(status.as_str())
        .bind(&checked_at)
        .bind(&checked_at)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Applies owner-editable fields. Absent fields are left unchanged.
    pub async fn update_preferences(
        &self,
        id: i64,
        user_id: &str,
        patch: &DomainPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<WatchedDomain, DomainError> {
        let sql = format!(
            "UPDATE domains \
             SET notify_if_available = COALESCE(?, notify_if_available), \
                 notes = CASE WHEN ? THEN ? ELSE notes END, \
                 updated_at = ? \
             WHERE id = ? AND user_id = ? \
             RETURNING {DOMAIN_COLUMNS}"
        );
        let notes = patch.notes.as_ref();
        sqlx::query_as::<_, DomainRow>(&sql)
            .bind(patch.notify_if_available.map(i64::from))
            .bind(notes.is_some())
            .bind(notes.and_then(|value| value.as_deref()))
            .bind(to_rfc3339(updated_at))
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .map(DomainRow::into_domain)
            .ok_or(DomainError::NotFound)
    }

    /// Removes a domain from the owner's watchlist. Its history rows are kept.
    pub async fn delete_for_user(&self, id: i64, user_id: &str) -> Result<(), DomainError> {
        let result = sqlx::query("DELETE FROM domains WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }
}

/// Data required to add a domain to a watchlist.
pub struct NewWatchedDomain<'a> {
    pub user_id: &'a str,
    pub domain: &'a str,
    pub notify_if_available: bool,
    pub notes: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Owner-editable fields.
///
/// `notes: Some(None)` clears the notes; `None` leaves them untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainPatch {
    pub notify_if_available: Option<bool>,
    pub notes: Option<Option<String>>,
}

/// Errors produced by the domain repository.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("this domain is already in your watchlist")]
    Duplicate,
    #[error("domain not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct DomainRow {
    id: i64,
    user_id: String,
    domain: String,
    status: String,
    last_checked: Option<DateTime<Utc>>,
    notify_if_available: i64,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DomainRow {
    fn into_domain(self) -> WatchedDomain {
        WatchedDomain {
            id: self.id,
            user_id: self.user_id,
            domain: self.domain,
            status: self.status.parse().unwrap_or(DomainStatus::Unknown),
            last_checked: self.last_checked,
            notify_if_available: self.notify_if_available != 0,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
