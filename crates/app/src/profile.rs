use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use domain_watch_storage::{Profile, ProfileUpsert};

use crate::auth::Principal;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::watchlist::{present_or_null, profile_problem};

#[derive(Debug, Default, Deserialize)]
pub struct ProfileRequest {
    #[serde(default, deserialize_with = "present_or_null")]
    pub full_name: Option<Option<String>>,
    #[serde(default)]
    pub notifications_enabled: Option<bool>,
}

pub async fn show(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Profile>, ProblemResponse> {
    let profile = state
        .storage()
        .profiles()
        .fetch(&principal.user_id)
        .await
        .map_err(profile_problem)?;
    Ok(Json(profile))
}

/// Creates or updates the caller's profile; the contact address comes from
/// the identity token.
pub async fn save(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<ProfileRequest>,
) -> Result<Json<Profile>, ProblemResponse> {
    let full_name = request.full_name.map(|name| {
        name.map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    });
    let profile = state
        .storage()
        .profiles()
        .upsert(&ProfileUpsert {
            user_id: &principal.user_id,
            email: principal.email.as_deref().unwrap_or_default(),
            full_name: full_name.as_ref().map(|name| name.as_deref()),
            notifications_enabled: request.notifications_enabled,
            updated_at: state.now(),
        })
        .await
        .map_err(profile_problem)?;

    info!(stage = "api", user_id = %profile.id, notifications_enabled = profile.notifications_enabled, "profile saved");
    Ok(Json(profile))
}
