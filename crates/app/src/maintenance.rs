use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use sqlx::Error as SqlxError;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use domain_watch_storage::Database;

use crate::orchestrator::Clock;

const BATCH_LIMIT: i64 = 1000;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// Background worker for history retention and WAL checkpoints.
#[derive(Clone)]
pub struct MaintenanceWorker {
    database: Database,
    retention_days: Option<u32>,
    clock: Clock,
    interval: Duration,
}

impl MaintenanceWorker {
    /// Creates a worker with default clock and cadence. Without a retention
    /// period history is kept indefinitely.
    pub fn new(database: Database, retention_days: Option<u32>) -> Self {
        Self {
            database,
            retention_days,
            clock: std::sync::Arc::new(Utc::now),
            interval: DEFAULT_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the worker loop in the background.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) => debug!(
                    stage = "storage",
                    pruned = report.pruned,
                    checkpoint_busy = report.checkpoint_busy,
                    "maintenance run finished"
                ),
                Err(err) => error!(stage = "storage", error = %err, "maintenance run failed"),
            }
        }
    }

    /// Executes one maintenance cycle (retention sweep + checkpoint).
    pub async fn run_once(&self) -> Result<MaintenanceReport, MaintenanceError> {
        let mut report = MaintenanceReport::default();

        if let Some(days) = self.retention_days {
            let threshold = (self.clock)() - ChronoDuration::days(i64::from(days));
            let (deleted, busy) = self.prune_history(threshold).await?;
            report.pruned = deleted;
            info!(
                stage = "storage",
                table = "domain_checks",
                deleted,
                busy,
                threshold = %threshold.to_rfc3339(),
                "check history retention sweep completed"
            );
        }

        report.checkpoint_busy = self.run_checkpoint().await?;
        Ok(report)
    }

    async fn prune_history(&self, threshold: DateTime<Utc>) -> Result<(u64, bool), MaintenanceError> {
        let repo = self.database.checks();
        let mut total_deleted = 0u64;
        let mut busy = false;

        loop {
            match repo.delete_older_than_batch(threshold, BATCH_LIMIT).await {
                Ok(0) => break,
                Ok(batch_deleted) => {
                    total_deleted += batch_deleted;
                    counter!("db_history_pruned_total").increment(batch_deleted);
                }
                Err(err) => {
                    if is_sqlite_busy(&err) {
                        busy = true;
                        counter!("db_busy_total", "op" => "retention").increment(1);
                        warn!(stage = "storage", error = %err, "history prune hit busy timeout");
                        break;
                    }

                    return Err(MaintenanceError::Prune { source: err });
                }
            }
        }

        Ok((total_deleted, busy))
    }

    async fn run_checkpoint(&self) -> Result<bool, MaintenanceError> {
        let start = std::time::Instant::now();

        match self.database.wal_checkpoint_truncate().await {
            Ok(stats) => {
                let duration = start.elapsed().as_secs_f64();
                histogram!("db_checkpoint_seconds").record(duration);
                let busy = stats.busy_frames > 0;
                if busy {
                    counter!("db_busy_total", "op" => "checkpoint").increment(1);
                    warn!(
                        stage = "storage",
                        busy_frames = stats.busy_frames,
                        log_frames = stats.log_frames,
                        checkpointed_frames = stats.checkpointed_frames,
                        duration_secs = duration,
                        "WAL checkpoint completed with busy frames"
                    );
                } else {
                    info!(
                        stage = "storage",
                        log_frames = stats.log_frames,
                        checkpointed_frames = stats.checkpointed_frames,
                        duration_secs = duration,
                        "WAL checkpoint completed"
                    );
                }
                Ok(busy)
            }
            Err(err) if is_sqlite_busy(&err) => {
                counter!("db_busy_total", "op" => "checkpoint").increment(1);
                warn!(stage = "storage", error = %err, "WAL checkpoint hit busy timeout");
                Ok(true)
            }
            Err(err) => Err(MaintenanceError::Checkpoint { source: err }),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub pruned: u64,
    pub checkpoint_busy: bool,
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("failed to prune check history")]
    Prune {
        #[source]
        source: SqlxError,
    },
    #[error("failed to run WAL checkpoint")]
    Checkpoint {
        #[source]
        source: SqlxError,
    },
}

fn is_sqlite_busy(err: &SqlxError) -> bool {
    match err {
        SqlxError::Database(db_err) => matches!(db_err.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry;
    use crate::test_support::{fixed_clock, setup_db, ts};
    use domain_watch_core::types::DomainStatus;
    use domain_watch_storage::NewCheckRecord;

    async fn seed_history(db: &Database) {
        for at in [
            "2024-01-01T00:00:00Z",
            "2024-02-01T00:00:00Z",
            "2024-05-30T00:00:00Z",
        ] {
            db.checks()
                .append(&NewCheckRecord {
                    domain_id: 1,
                    status: DomainStatus::Taken,
                    check_date: ts(at),
                    details: None,
                })
                .await
                .expect("append");
        }
    }

    #[tokio::test]
    async fn run_once_prunes_history_past_retention() {
        telemetry::init_metrics().expect("metrics");
        let db = setup_db().await;
        seed_history(&db).await;

        let worker = MaintenanceWorker::new(db.clone(), Some(30))
            .with_clock(fixed_clock("2024-06-01T00:00:00Z"));
        let report = worker.run_once().await.expect("run_once");
        assert_eq!(report.pruned, 2);

        let remaining = db.checks().recent(1, 10).await.expect("recent");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].check_date, ts("2024-05-30T00:00:00Z"));
    }

    #[tokio::test]
    async fn history_is_kept_without_retention() {
        let db = setup_db().await;
        seed_history(&db).await;

        let worker = MaintenanceWorker::new(db.clone(), None)
            .with_clock(fixed_clock("2030-01-01T00:00:00Z"));
        let report = worker.run_once().await.expect("run_once");
        assert_eq!(report.pruned, 0);
        assert_eq!(db.checks().recent(1, 10).await.expect("recent").len(), 3);
    }
}
