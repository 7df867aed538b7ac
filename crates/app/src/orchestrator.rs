use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use domain_watch_core::ports::AvailabilityProber;
use domain_watch_core::types::{
    CheckResult, CycleReport, DomainStatus, ProbeOutcome, WatchedDomain,
};
use domain_watch_storage::{Database, NewCheckRecord};

use crate::notify::{NotificationTrigger, NotifyOutcome};
use crate::selector::{CheckTarget, Selector, DEFAULT_BATCH_LIMIT};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Limits on how much work one cycle may start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleBudget {
    pub max_duration: Option<Duration>,
    pub max_probes: Option<usize>,
}

impl CycleBudget {
    fn exhausted(&self, started: Instant, launched: usize) -> bool {
        self.max_probes.is_some_and(|max| launched >= max)
            || self
                .max_duration
                .is_some_and(|max| started.elapsed() >= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSettings {
    pub probe_timeout: Duration,
    pub default_limit: u32,
    pub max_concurrency: Option<usize>,
    pub budget: CycleBudget,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            default_limit: DEFAULT_BATCH_LIMIT,
            max_concurrency: None,
            budget: CycleBudget::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("domain store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Runs check cycles: probe, persist, then hand off to the notification trigger.
#[derive(Clone)]
pub struct CheckOrchestrator {
    database: Database,
    selector: Selector,
    prober: Arc<dyn AvailabilityProber>,
    trigger: NotificationTrigger,
    clock: Clock,
    settings: CycleSettings,
}

impl CheckOrchestrator {
    pub fn new(
        database: Database,
        prober: Arc<dyn AvailabilityProber>,
        trigger: NotificationTrigger,
        settings: CycleSettings,
    ) -> Self {
        Self {
            selector: Selector::new(database.clone(), settings.default_limit),
            database,
            prober,
            trigger,
            clock: Arc::new(Utc::now),
            settings,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Selects candidates for `target` and checks them.
    pub async fn run(&self, target: &CheckTarget) -> Result<CycleReport, CycleError> {
        let candidates = self.selector.select(target).await?;
        Ok(self.run_cycle(candidates).await)
    }

    /// Checks every candidate independently; one result per launched candidate,
    /// in candidate order.
    pub async fn run_cycle(&self, candidates: Vec<WatchedDomain>) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("check_cycle", %cycle_id);
        self.run_cycle_inner(candidates).instrument(span).await
    }

    async fn run_cycle_inner(&self, candidates: Vec<WatchedDomain>) -> CycleReport {
        let total = candidates.len();
        if total == 0 {
            info!(stage = "orchestrator", "no domains to check");
            return CycleReport::default();
        }

        let started = Instant::now();
        let cap = self
            .settings
            .max_concurrency
            .map_or(total, |max| max.min(total))
            .max(1);
        let semaphore = Arc::new(Semaphore::new(cap));
        info!(stage = "orchestrator", candidates = total, concurrency = cap, "check cycle started");

        let names: Vec<String> = candidates.iter().map(|d| d.domain.clone()).collect();
        let mut tasks = JoinSet::new();
        let mut launched = 0usize;

        for (index, domain) in candidates.into_iter().enumerate() {
            if self.settings.budget.exhausted(started, launched) {
                break;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if self.settings.budget.exhausted(started, launched) {
                break;
            }
            launched += 1;

            let worker = self.clone();
            tasks.spawn(
                async move {
                    let _permit = permit;
                    (index, worker.check_one(domain).await)
                }
                .in_current_span(),
            );
        }

        let mut slots: Vec<Option<CheckResult>> = vec![None; launched];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => {
                    error!(stage = "orchestrator", error = %err, "check task aborted");
                    counter!("domain_check_failures_total", "step" => "task").increment(1);
                }
            }
        }

        let now = self.now();
        let results: Vec<CheckResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| CheckResult {
                    domain: names[index].clone(),
                    status: DomainStatus::Unknown,
                    checked_at: now,
                    persisted: false,
                    notified: false,
                    error: Some("check task aborted".to_string()),
                })
            })
            .collect();

        let skipped = total - launched;
        if skipped > 0 {
            warn!(stage = "orchestrator", skipped, "cycle budget exhausted; remaining candidates deferred");
        }

        let elapsed = started.elapsed().as_secs_f64();
        histogram!("check_cycle_seconds").record(elapsed);
        let report = CycleReport::from_results(results, skipped);
        info!(
            stage = "orchestrator",
            checked = report.checked,
            skipped = report.skipped,
            duration_secs = elapsed,
            "check cycle completed"
        );
        report
    }

    async fn check_one(&self, domain: WatchedDomain) -> CheckResult {
        let outcome = self.probe(&domain.domain).await;
        let checked_at = self.now();
        counter!("domain_checks_total", "status" => outcome.status.as_str()).increment(1);

        let mut result = CheckResult {
            domain: domain.domain.clone(),
            status: outcome.status,
            checked_at,
            persisted: false,
            notified: false,
            error: None,
        };

        // History is appended only once the domain row reflects this check.
        match self
            .database
            .domains()
            .record_status(domain.id, &domain.user_id, outcome.status, checked_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(stage = "storage", domain = %domain.domain, id = domain.id, "domain removed during cycle; result discarded");
                counter!("domain_check_failures_total", "step" => "update").increment(1);
                result.error = Some("domain no longer exists".to_string());
                return result;
            }
            Err(err) => {
                error!(stage = "storage", domain = %domain.domain, error = %err, "failed to update domain status");
                counter!("domain_check_failures_total", "step" => "update").increment(1);
                result.error = Some(format!("failed to update domain: {err}"));
                return result;
            }
        }

        let appended = self
            .database
            .checks()
            .append(&NewCheckRecord {
                domain_id: domain.id,
                status: outcome.status,
                check_date: checked_at,
                details: Some(&outcome.details),
            })
            .await;
        let record_id = match appended {
            Ok(record_id) => record_id,
            Err(err) => {
                error!(stage = "storage", domain = %domain.domain, error = %err, "failed to append check record");
                counter!("domain_check_failures_total", "step" => "append").increment(1);
                result.error = Some(format!("failed to record check: {err}"));
                return result;
            }
        };
        result.persisted = true;

        let previous = match self.database.checks().status_before(domain.id, record_id).await {
            Ok(previous) => previous,
            Err(err) => {
                error!(stage = "storage", domain = %domain.domain, error = %err, "failed to read previous check");
                counter!("domain_check_failures_total", "step" => "history").increment(1);
                result.error = Some(format!("failed to read check history: {err}"));
                return result;
            }
        };

        match self.trigger.maybe_notify(&domain, previous, outcome.status).await {
            NotifyOutcome::Sent => result.notified = true,
            NotifyOutcome::Failed(reason) => {
                result.error = Some(format!("notification failed: {reason}"));
            }
            NotifyOutcome::Skipped(reason) => {
                debug!(stage = "orchestrator", domain = %domain.domain, reason = reason.as_str(), "transition not notified");
            }
            NotifyOutcome::NotApplicable => {}
        }
        result
    }

    /// Runs the prober in its own task so a panic or stall stays contained.
    async fn probe(&self, name: &str) -> ProbeOutcome {
        let prober = Arc::clone(&self.prober);
        let owned = name.to_string();
        let started = Instant::now();
        let handle = tokio::spawn(async move { prober.probe(&owned).await });
        let abort = handle.abort_handle();

        let outcome = match tokio::time::timeout(self.settings.probe_timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(stage = "probe", domain = %name, error = %err, "probe task failed");
                ProbeOutcome::unknown("probe failed unexpectedly")
            }
            Err(_) => {
                abort.abort();
                warn!(stage = "probe", domain = %name, timeout_secs = self.settings.probe_timeout.as_secs_f64(), "probe timed out");
                ProbeOutcome::unknown("probe timed out")
            }
        };
        histogram!("probe_latency_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}
