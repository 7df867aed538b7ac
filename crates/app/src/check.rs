use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::{error, info};

use domain_watch_core::normalizer::ValidationError;
use domain_watch_core::types::{CheckResult, CycleReport};

use crate::auth::authorize_service;
use crate::orchestrator::CycleError;
use crate::problem::ProblemResponse;
use crate::router::AppState;
use crate::selector::CheckTarget;

/// Parameters accepted by the check trigger, as JSON body or query string.
#[derive(Debug, Default, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default, deserialize_with = "lenient_limit")]
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LimitValue {
    Number(f64),
    Text(String),
}

/// Accepts `10`, `10.0`, `"10"` and `"10 domains"` alike; a blank value means
/// "use the default". Fractions are truncated.
fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let parsed = match Option::<LimitValue>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(LimitValue::Text(text)) if text.trim().is_empty() => return Ok(None),
        Some(LimitValue::Number(value)) if value.is_finite() && value >= 0.0 => {
            Some(value.trunc().min(f64::from(u32::MAX)) as u32)
        }
        Some(LimitValue::Number(_)) => None,
        Some(LimitValue::Text(text)) => leading_integer(&text),
    };
    parsed
        .map(Some)
        .ok_or_else(|| de::Error::custom("limit must be a non-negative integer"))
}

fn leading_integer(text: &str) -> Option<u32> {
    let trimmed = text.trim_start();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    Some(digits[..end].parse::<u32>().unwrap_or(u32::MAX))
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub message: &'static str,
    pub checked: usize,
    pub skipped: usize,
    pub results: Vec<CheckResult>,
}

impl From<CycleReport> for CheckResponse {
    fn from(report: CycleReport) -> Self {
        let message = if report.is_empty() {
            "No domains to check"
        } else {
            "Domain checks completed"
        };
        Self {
            message,
            checked: report.checked,
            skipped: report.skipped,
            results: report.results,
        }
    }
}

pub async fn trigger_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CheckResponse>, ProblemResponse> {
    authorize_service(&state, &headers)?;
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CheckRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ProblemResponse::bad_request(format!("invalid request body: {err}")))?
    };
    run_trigger(&state, request).await
}

pub async fn trigger_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(request): Query<CheckRequest>,
) -> Result<Json<CheckResponse>, ProblemResponse> {
    authorize_service(&state, &headers)?;
    run_trigger(&state, request).await
}

async fn run_trigger(
    state: &AppState,
    request: CheckRequest,
) -> Result<Json<CheckResponse>, ProblemResponse> {
    let target = CheckTarget::from_request(request.domain.as_deref(), request.limit)
        .map_err(validation_problem)?;
    info!(stage = "api", target = ?target, "check cycle triggered");

    let report = state.orchestrator().run(&target).await.map_err(cycle_problem)?;
    Ok(Json(report.into()))
}

pub(crate) fn validation_problem(err: ValidationError) -> ProblemResponse {
    ProblemResponse::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_domain", err.to_string())
}

pub(crate) fn cycle_problem(err: CycleError) -> ProblemResponse {
    error!(stage = "api", error = %err, "check cycle aborted");
    match err {
        CycleError::StoreUnavailable(_) => ProblemResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "store_unavailable",
            "the domain store is currently unavailable",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ts;
    use domain_watch_core::types::DomainStatus;

    #[test]
    fn response_message_reflects_report() {
        let empty: CheckResponse = CycleReport::default().into();
        assert_eq!(empty.message, "No domains to check");

        let result = CheckResult {
            domain: "example.com".to_string(),
            status: DomainStatus::Taken,
            checked_at: ts("2024-01-01T00:00:00Z"),
            persisted: true,
            notified: false,
            error: None,
        };
        let done: CheckResponse = CycleReport::from_results(vec![result], 0).into();
        assert_eq!(done.message, "Domain checks completed");
        assert_eq!(done.checked, 1);
    }

    fn parse_limit(body: &str) -> Result<Option<u32>, serde_json::Error> {
        serde_json::from_str::<CheckRequest>(body).map(|request| request.limit)
    }

    #[test]
    fn limit_accepts_numeric_strings_and_floats() {
        assert_eq!(parse_limit(r#"{"limit": 10}"#).unwrap(), Some(10));
        assert_eq!(parse_limit(r#"{"limit": "10"}"#).unwrap(), Some(10));
        assert_eq!(parse_limit(r#"{"limit": 10.0}"#).unwrap(), Some(10));
        assert_eq!(parse_limit(r#"{"limit": 7.9}"#).unwrap(), Some(7));
        assert_eq!(parse_limit(r#"{"limit": " 25abc"}"#).unwrap(), Some(25));
        assert_eq!(parse_limit(r#"{"limit": ""}"#).unwrap(), None);
        assert_eq!(parse_limit(r#"{"limit": null}"#).unwrap(), None);
        assert_eq!(parse_limit(r#"{}"#).unwrap(), None);
    }

    #[test]
    fn limit_rejects_non_numeric_values() {
        assert!(parse_limit(r#"{"limit": "ten"}"#).is_err());
        assert!(parse_limit(r#"{"limit": -1}"#).is_err());
        assert!(parse_limit(r#"{"limit": true}"#).is_err());
    }

    #[test]
    fn invalid_domain_maps_to_unprocessable() {
        let problem = validation_problem(ValidationError::Empty);
        let response = axum::response::IntoResponse::into_response(problem);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
