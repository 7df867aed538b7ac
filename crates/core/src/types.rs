use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Availability status tracked for a watched domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Pending,
    Available,
    Taken,
    Unknown,
}

impl DomainStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Taken => "taken",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "available" => Ok(Self::Available),
            "taken" => Ok(Self::Taken),
            "unknown" => Ok(Self::Unknown),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Raised when a persisted status string does not map to [`DomainStatus`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised domain status: {0}")]
pub struct UnknownStatus(pub String);

/// A domain on a user's watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedDomain {
    pub id: i64,
    pub user_id: String,
    pub domain: String,
    pub status: DomainStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub notify_if_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry in a domain's append-only check history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub id: i64,
    pub domain_id: i64,
    pub status: DomainStatus,
    pub check_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Notification preferences owned by the profile subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreference {
    pub email: String,
    pub notifications_enabled: bool,
}

/// Result of a single availability lookup.
///
/// `details` carries the raw upstream body on success and a diagnostic
/// object (`error`, optional `statusCode`) when the lookup failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub status: DomainStatus,
    pub details: Value,
}

impl ProbeOutcome {
    pub fn new(status: DomainStatus, details: Value) -> Self {
        Self { status, details }
    }

    /// Builds an `unknown` outcome carrying a diagnostic cause.
    pub fn unknown(error: impl Into<String>) -> Self {
        Self {
            status: DomainStatus::Unknown,
            details: serde_json::json!({ "error": error.into() }),
        }
    }
}

/// Per-domain outcome reported by a check cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub domain: String,
    pub status: DomainStatus,
    pub checked_at: DateTime<Utc>,
    pub persisted: bool,
    pub notified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one check cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub checked: usize,
    pub skipped: usize,
    pub results: Vec<CheckResult>,
}

impl CycleReport {
    pub fn from_results(results: Vec<CheckResult>, skipped: usize) -> Self {
        Self {
            checked: results.len(),
            skipped,
            results,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.skipped == 0
    }
}
