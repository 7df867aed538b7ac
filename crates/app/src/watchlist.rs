use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info};

use domain_watch_core::normalizer::DomainName;
use domain_watch_core::types::{CheckRecord, WatchedDomain};
use domain_watch_storage::{
    CheckError, DomainError, DomainPatch, NewWatchedDomain, ProfileError, ProfileUpsert,
};

use crate::auth::Principal;
use crate::check::{cycle_problem, validation_problem, CheckResponse};
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::selector::CheckTarget;

const DEFAULT_HISTORY_LIMIT: u32 = 20;
const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct CreateDomainRequest {
    pub domain: String,
    #[serde(default = "default_notify")]
    pub notify_if_available: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_notify() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDomainRequest {
    #[serde(default)]
    pub notify_if_available: Option<bool>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub before: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub checks: Vec<CheckRecord>,
    pub next_before: Option<i64>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
pub(crate) fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

pub async fn create(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateDomainRequest>,
) -> Result<(StatusCode, Json<WatchedDomain>), ProblemResponse> {
    let name = DomainName::parse(&request.domain).map_err(validation_problem)?;
    let now = state.now();

    state
        .storage()
        .profiles()
        .upsert(&ProfileUpsert {
            user_id: &principal.user_id,
            email: principal.email.as_deref().unwrap_or_default(),
            full_name: None,
            notifications_enabled: None,
            updated_at: now,
        })
        .await
        .map_err(profile_problem)?;

    let notes = non_blank(request.notes);
    let created = state
        .storage()
        .domains()
        .insert(&NewWatchedDomain {
            user_id: &principal.user_id,
            domain: name.as_str(),
            notify_if_available: request.notify_if_available,
            notes: notes.as_deref(),
            created_at: now,
        })
        .await
        .map_err(domain_problem)?;

    info!(stage = "api", user_id = %principal.user_id, domain = %created.domain, id = created.id, "domain added to watchlist");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<WatchedDomain>>, ProblemResponse> {
    let domains = state
        .storage()
        .domains()
        .list_for_user(&principal.user_id)
        .await
        .map_err(domain_problem)?;
    Ok(Json(domains))
}

pub async fn update(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Json(request): Json<UpdateDomainRequest>,
) -> Result<Json<WatchedDomain>, ProblemResponse> {
    let patch = DomainPatch {
        notify_if_available: request.notify_if_available,
        notes: request.notes.map(non_blank),
    };
    let updated = state
        .storage()
        .domains()
        .update_preferences(id, &principal.user_id, &patch, state.now())
        .await
        .map_err(domain_problem)?;
    Ok(Json(updated))
}

pub async fn remove(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<StatusCode, ProblemResponse> {
    state
        .storage()
        .domains()
        .delete_for_user(id, &principal.user_id)
        .await
        .map_err(domain_problem)?;
    info!(stage = "api", user_id = %principal.user_id, id, "domain removed from watchlist");
    Ok(StatusCode::NO_CONTENT)
}

/// Runs an immediate check of one of the caller's domains.
pub async fn check_now(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
) -> Result<Json<CheckResponse>, ProblemResponse> {
    let domain = state
        .storage()
        .domains()
        .fetch_for_user(id, &principal.user_id)
        .await
        .map_err(domain_problem)?;

    let target = CheckTarget::Domain {
        name: domain.domain,
        owner: Some(principal.user_id),
    };
    let report = state
        .orchestrator()
        .run(&target)
        .await
        .map_err(cycle_problem)?;
    Ok(Json(report.into()))
}

pub async fn history(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ProblemResponse> {
    state
        .storage()
        .domains()
        .fetch_for_user(id, &principal.user_id)
        .await
        .map_err(domain_problem)?;

    let limit = query
        .limit
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let checks = state
        .storage()
        .checks()
        .page(id, query.before, limit)
        .await
        .map_err(history_problem)?;

    let next_before = if checks.len() == limit as usize {
        checks.last().map(|record| record.id)
    } else {
        None
    };
    Ok(Json(HistoryPage {
        checks,
        next_before,
    }))
}

fn domain_problem(err: DomainError) -> ProblemResponse {
    match err {
        DomainError::Duplicate => {
            ProblemResponse::new(StatusCode::CONFLICT, "duplicate_domain", err.to_string())
        }
        DomainError::NotFound => ProblemResponse::not_found("domain not found"),
        DomainError::Database(err) => {
            error!(stage = "api", error = %err, "domain store query failed");
            ProblemResponse::internal("failed to access the domain store")
        }
    }
}

pub(crate) fn profile_problem(err: ProfileError) -> ProblemResponse {
    match err {
        ProfileError::NotFound => ProblemResponse::not_found("profile not found"),
        ProfileError::Database(err) => {
            error!(stage = "api", error = %err, "profile store query failed");
            ProblemResponse::internal("failed to access the profile store")
        }
    }
}

fn history_problem(err: CheckError) -> ProblemResponse {
    error!(stage = "api", error = %err, "check history query failed");
    ProblemResponse::internal("failed to load check history")
}
