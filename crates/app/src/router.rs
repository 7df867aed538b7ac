use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

use domain_watch_storage::Database;

use crate::auth::TokenValidator;
use crate::orchestrator::{CheckOrchestrator, Clock};
use crate::{check, profile, telemetry, watchlist};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    orchestrator: CheckOrchestrator,
    clock: Clock,
    token_validator: Option<TokenValidator>,
    service_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        orchestrator: CheckOrchestrator,
        auth_jwt_secret: Option<&str>,
        service_token: Option<String>,
    ) -> Self {
        Self {
            metrics,
            storage,
            orchestrator,
            clock: Arc::new(Utc::now),
            token_validator: auth_jwt_secret.map(|secret| TokenValidator::new(secret.as_bytes())),
            service_token: service_token.map(Arc::from),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock.clone();
        self.orchestrator = self.orchestrator.with_clock(clock);
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn orchestrator(&self) -> &CheckOrchestrator {
        &self.orchestrator
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn token_validator(&self) -> Option<&TokenValidator> {
        self.token_validator.as_ref()
    }

    pub fn service_token(&self) -> Option<&str> {
        self.service_token.as_deref()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route(
            "/functions/check-domains",
            get(check::trigger_get).post(check::trigger_post),
        )
        .route("/api/domains", get(watchlist::list).post(watchlist::create))
        .route(
            "/api/domains/:id",
            patch(watchlist::update).delete(watchlist::remove),
        )
        .route("/api/domains/:id/check", post(watchlist::check_now))
        .route("/api/domains/:id/checks", get(watchlist::history))
        .route("/api/profile", get(profile::show).put(profile::save))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    match state.storage().ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(stage = "api", error = %err, "health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}
