use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use domain_watch_core::ports::{
    AvailabilityProber, DispatchError, Notification, NotificationDispatcher,
};
use domain_watch_core::types::{DomainStatus, ProbeOutcome, WatchedDomain};
use domain_watch_storage::{Database, NewWatchedDomain, ProfileUpsert};

use crate::notify::NotificationTrigger;
use crate::orchestrator::{CheckOrchestrator, CycleSettings};
use crate::router::AppState;
use crate::telemetry;

pub const SERVICE_TOKEN: &str = "service-token";
pub const JWT_SECRET: &str = "jwt-secret";

pub async fn setup_db() -> Database {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    db.run_migrations().await.expect("migrations");
    db
}

/// Application state wired to `db` with the given collaborators.
pub fn test_state(
    db: &Database,
    prober: impl AvailabilityProber + 'static,
    dispatcher: impl NotificationDispatcher + 'static,
) -> AppState {
    let metrics = telemetry::init_metrics().expect("metrics init");
    let trigger = NotificationTrigger::new(db.clone(), Arc::new(dispatcher));
    let orchestrator = CheckOrchestrator::new(
        db.clone(),
        Arc::new(prober),
        trigger,
        CycleSettings {
            probe_timeout: Duration::from_secs(5),
            ..CycleSettings::default()
        },
    );
    AppState::new(
        metrics,
        db.clone(),
        orchestrator,
        Some(JWT_SECRET),
        Some(SERVICE_TOKEN.to_string()),
    )
    .with_clock(fixed_clock("2024-06-01T12:00:00Z"))
}

pub fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("timestamp")
        .with_timezone(&Utc)
}

pub fn fixed_clock(value: &str) -> Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> {
    let now = ts(value);
    Arc::new(move || now)
}

pub async fn seed_domain(db: &Database, user_id: &str, name: &str, notify: bool) -> WatchedDomain {
    db.domains()
        .insert(&NewWatchedDomain {
            user_id,
            domain: name,
            notify_if_available: notify,
            notes: None,
            created_at: ts("2024-01-01T00:00:00Z"),
        })
        .await
        .expect("seed domain")
}

pub async fn seed_profile(db: &Database, user_id: &str, email: &str, enabled: bool) {
    db.profiles()
        .upsert(&ProfileUpsert {
            user_id,
            email,
            full_name: None,
            notifications_enabled: Some(enabled),
            updated_at: ts("2024-01-01T00:00:00Z"),
        })
        .await
        .expect("seed profile");
}

#[derive(Clone, Copy)]
pub enum Scripted {
    Status(DomainStatus),
    Panic,
    Hang,
}

/// Prober double answering from a fixed table; unlisted names are `taken`.
#[derive(Clone, Default)]
pub struct ScriptedProber {
    answers: Arc<Mutex<HashMap<String, Scripted>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, domain: &str, answer: Scripted) -> Self {
        self.set(domain, answer);
        self
    }

    pub fn set(&self, domain: &str, answer: Scripted) {
        self.answers
            .lock()
            .expect("answers")
            .insert(domain.to_string(), answer);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl AvailabilityProber for ScriptedProber {
    async fn probe(&self, domain: &str) -> ProbeOutcome {
        self.calls.lock().expect("calls").push(domain.to_string());
        let answer = self
            .answers
            .lock()
            .expect("answers")
            .get(domain)
            .copied()
            .unwrap_or(Scripted::Status(DomainStatus::Taken));
        match answer {
            Scripted::Status(status) => ProbeOutcome::new(
                status,
                json!({ "available": status == DomainStatus::Available }),
            ),
            Scripted::Panic => panic!("registry lookup exploded for {domain}"),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                ProbeOutcome::unknown("unreachable")
            }
        }
    }
}

/// Dispatcher double that records every notification it is handed.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("sent").clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .expect("sent")
            .push(notification.clone());
        if self.fail {
            return Err(DispatchError::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}
