use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use domain_watch_core::types::UserPreference;

use crate::to_rfc3339;

/// Repository for user profiles and their notification preference.
#[derive(Clone)]
pub struct ProfileRepository {
    pool: SqlitePool,
}

impl ProfileRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the profile if missing, otherwise applies the provided fields.
    ///
    /// Keyed by user id, so concurrent callers converge on one row. New
    /// profiles default to notifications enabled; an empty `email` never
    /// overwrites a stored address.
    pub async fn upsert(&self, profile: &ProfileUpsert<'_>) -> Result<Profile, ProfileError> {
        let now = to_rfc3339(profile.updated_at);
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
INSERT INTO profiles (id, email, full_name, notifications_enabled, created_at, updated_at)
VALUES (?1, ?2, ?3, COALESCE(?4, 1), ?5, ?5)
ON CONFLICT(id) DO UPDATE SET
    email = CASE WHEN excluded.email <> '' THEN excluded.email ELSE profiles.email END,
    full_name = CASE WHEN ?6 THEN excluded.full_name ELSE profiles.full_name END,
    notifications_enabled = COALESCE(?4, profiles.notifications_enabled),
    updated_at = excluded.updated_at
RETURNING id, email, full_name, notifications_enabled, created_at, updated_at
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.email)
        .bind(profile.full_name.flatten())
        .bind(profile.notifications_enabled.map(i64::from))
        .bind(&now)
        .bind(profile.full_name.is_some())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_profile())
    }

    /// Loads a profile by user id.
    pub async fn fetch(&self, user_id: &str) -> Result<Profile, ProfileError> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, full_name, notifications_enabled, created_at, updated_at \
             FROM profiles WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(ProfileRow::into_profile)
        .ok_or(ProfileError::NotFound)
    }

    /// Loads only the notification preference; `None` when no profile exists.
    pub async fn fetch_preference(
        &self,
        user_id: &str,
    ) -> Result<Option<UserPreference>, ProfileError> {
        match self.fetch(user_id).await {
            Ok(profile) => Ok(Some(profile.preference())),
            Err(ProfileError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Fields applied by [`ProfileRepository::upsert`].
///
/// `None` leaves the stored value untouched; `full_name: Some(None)` clears it.
pub struct ProfileUpsert<'a> {
    pub user_id: &'a str,
    pub email: &'a str,
    pub full_name: Option<Option<&'a str>>,
    pub notifications_enabled: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

/// User profile as stored by the account subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub notifications_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn preference(&self) -> UserPreference {
        UserPreference {
            email: self.email.clone(),
            notifications_enabled: self.notifications_enabled,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: String,
    email: String,
    full_name: Option<String>,
    notifications_enabled: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRow {
    fn into_profile(self) -> Profile {
        Profile {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            notifications_enabled: self.notifications_enabled != 0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
