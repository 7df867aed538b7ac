use tracing::{debug, error};

use domain_watch_core::normalizer::{DomainName, ValidationError};
use domain_watch_core::types::WatchedDomain;
use domain_watch_storage::Database;

use crate::orchestrator::CycleError;

pub const DEFAULT_BATCH_LIMIT: u32 = 50;
pub const MAX_BATCH_LIMIT: u32 = 500;

/// Which domains a check cycle should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckTarget {
    /// A single name. Without an owner the lowest-id match across all users
    /// is selected; with one, the lookup is scoped to that user.
    Domain { name: String, owner: Option<String> },
    /// The least recently checked domains, never-checked first.
    Batch { limit: Option<u32> },
}

impl CheckTarget {
    /// Builds a target from trigger parameters. A name takes precedence over
    /// a limit and is normalized before matching.
    pub fn from_request(domain: Option<&str>, limit: Option<u32>) -> Result<Self, ValidationError> {
        match domain.map(str::trim).filter(|value| !value.is_empty()) {
            Some(raw) => Ok(Self::Domain {
                name: DomainName::parse(raw)?.into_inner(),
                owner: None,
            }),
            None => Ok(Self::Batch { limit }),
        }
    }
}

/// Clamps a requested batch size; absent or zero falls back to `default`.
pub fn effective_limit(requested: Option<u32>, default: u32) -> u32 {
    let fallback = if default == 0 { DEFAULT_BATCH_LIMIT } else { default };
    match requested {
        Some(0) | None => fallback,
        Some(value) => value,
    }
    .min(MAX_BATCH_LIMIT)
}

/// Picks the candidates for a check cycle.
#[derive(Clone)]
pub struct Selector {
    database: Database,
    default_limit: u32,
}

impl Selector {
    pub fn new(database: Database, default_limit: u32) -> Self {
        Self {
            database,
            default_limit,
        }
    }

    pub async fn select(&self, target: &CheckTarget) -> Result<Vec<WatchedDomain>, CycleError> {
        let repo = self.database.domains();
        let selected = match target {
            CheckTarget::Domain { name, owner: None } => repo
                .find_first_by_name(name)
                .await
                .map(|found| found.into_iter().collect()),
            CheckTarget::Domain {
                name,
                owner: Some(user_id),
            } => repo
                .find_for_user_by_name(user_id, name)
                .await
                .map(|found| found.into_iter().collect()),
            CheckTarget::Batch { limit } => {
                repo.list_due(effective_limit(*limit, self.default_limit))
                    .await
            }
        };

        match selected {
            Ok(domains) => {
                debug!(stage = "selector", count = domains.len(), "selected check candidates");
                Ok(domains)
            }
            Err(err) => {
                error!(stage = "selector", error = %err, "failed to select check candidates");
                Err(CycleError::StoreUnavailable(err.to_string()))
            }
        }
    }
}
