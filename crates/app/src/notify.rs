use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, info, warn};

use domain_watch_core::policy::{NotificationDecision, NotificationPolicy, SkipReason};
use domain_watch_core::ports::{DispatchError, Notification, NotificationDispatcher};
use domain_watch_core::types::{DomainStatus, WatchedDomain};
use domain_watch_storage::Database;

/// Result of evaluating one completed check for a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Not a transition into availability the owner opted into.
    NotApplicable,
    /// A transition, but the owner's preferences suppress delivery.
    Skipped(SkipReason),
    Sent,
    Failed(String),
}

/// Fires the "became available" notification for a completed check.
#[derive(Clone)]
pub struct NotificationTrigger {
    database: Database,
    dispatcher: Arc<dyn NotificationDispatcher>,
    policy: NotificationPolicy,
}

impl NotificationTrigger {
    pub fn new(database: Database, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            database,
            dispatcher,
            policy: NotificationPolicy::new(),
        }
    }

    pub async fn maybe_notify(
        &self,
        domain: &WatchedDomain,
        previous: Option<DomainStatus>,
        current: DomainStatus,
    ) -> NotifyOutcome {
        if !self.policy.is_candidate(domain, previous, current) {
            return NotifyOutcome::NotApplicable;
        }

        let preference = match self.database.profiles().fetch_preference(&domain.user_id).await {
            Ok(preference) => preference,
            Err(err) => {
                warn!(stage = "notify", domain = %domain.domain, error = %err, "failed to load notification preference");
                counter!("notifications_total", "result" => "failed").increment(1);
                return NotifyOutcome::Failed(format!("failed to load profile: {err}"));
            }
        };

        match self
            .policy
            .evaluate(domain, previous, current, preference.as_ref())
        {
            NotificationDecision::Skip(reason) => {
                info!(stage = "notify", domain = %domain.domain, user_id = %domain.user_id, reason = reason.as_str(), "notification suppressed");
                counter!("notifications_total", "result" => "skipped").increment(1);
                NotifyOutcome::Skipped(reason)
            }
            NotificationDecision::Notify => {
                let Some(preference) = preference else {
                    return NotifyOutcome::Skipped(SkipReason::ProfileMissing);
                };
                let notification = Notification::domain_available(preference.email, &domain.domain);
                match self.dispatcher.dispatch(&notification).await {
                    Ok(()) => {
                        info!(stage = "notify", domain = %domain.domain, user_id = %domain.user_id, "availability notification sent");
                        counter!("notifications_total", "result" => "sent").increment(1);
                        NotifyOutcome::Sent
                    }
                    Err(err) => {
                        warn!(stage = "notify", domain = %domain.domain, error = %err, "availability notification failed");
                        counter!("notifications_total", "result" => "failed").increment(1);
                        NotifyOutcome::Failed(err.to_string())
                    }
                }
            }
        }
    }
}

/// Dispatcher used when no mail API is configured; notifications are only logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyDispatcher;

#[async_trait]
impl NotificationDispatcher for LogOnlyDispatcher {
    async fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        debug!(stage = "notify", body = %notification.body, "notification body");
        info!(stage = "notify", to = %notification.to, subject = %notification.subject, "mail delivery not configured; notification logged only");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_domain, seed_profile, setup_db, RecordingDispatcher};

    async fn trigger_with(dispatcher: RecordingDispatcher) -> (Database, NotificationTrigger) {
        let db = setup_db().await;
        let trigger = NotificationTrigger::new(db.clone(), Arc::new(dispatcher));
        (db, trigger)
    }

    #[tokio::test]
    async fn sends_once_on_transition_to_available() {
        let dispatcher = RecordingDispatcher::new();
        let (db, trigger) = trigger_with(dispatcher.clone()).await;
        seed_profile(&db, "u-1", "owner@example.com", true).await;
        let domain = seed_domain(&db, "u-1", "example.com", true).await;

        let outcome = trigger
            .maybe_notify(&domain, Some(DomainStatus::Taken), DomainStatus::Available)
            .await;
        assert_eq!(outcome, NotifyOutcome::Sent);

        let repeat = trigger
            .maybe_notify(&domain, Some(DomainStatus::Available), DomainStatus::Available)
            .await;
        assert_eq!(repeat, NotifyOutcome::NotApplicable);

        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
        assert!(sent[0].subject.contains("example.com"));
    }

    #[tokio::test]
    async fn respects_domain_and_profile_opt_outs() {
        let dispatcher = RecordingDispatcher::new();
        let (db, trigger) = trigger_with(dispatcher.clone()).await;
        seed_profile(&db, "u-1", "owner@example.com", true).await;
        seed_profile(&db, "u-2", "other@example.com", false).await;
        let muted = seed_domain(&db, "u-1", "muted.com", false).await;
        let disabled = seed_domain(&db, "u-2", "disabled.com", true).await;
        let orphan = seed_domain(&db, "u-3", "orphan.com", true).await;

        assert_eq!(
            trigger
                .maybe_notify(&muted, Some(DomainStatus::Taken), DomainStatus::Available)
                .await,
            NotifyOutcome::NotApplicable
        );
        assert_eq!(
            trigger
                .maybe_notify(&disabled, Some(DomainStatus::Taken), DomainStatus::Available)
                .await,
            NotifyOutcome::Skipped(SkipReason::UserOptedOut)
        );
        assert_eq!(
            trigger
                .maybe_notify(&orphan, None, DomainStatus::Available)
                .await,
            NotifyOutcome::Skipped(SkipReason::ProfileMissing)
        );
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_is_reported_not_raised() {
        let dispatcher = RecordingDispatcher::failing();
        let (db, trigger) = trigger_with(dispatcher.clone()).await;
        seed_profile(&db, "u-1", "owner@example.com", true).await;
        let domain = seed_domain(&db, "u-1", "example.com", true).await;

        let outcome = trigger
            .maybe_notify(&domain, Some(DomainStatus::Unknown), DomainStatus::Available)
            .await;
        assert!(matches!(outcome, NotifyOutcome::Failed(_)));
        assert_eq!(dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn log_only_dispatcher_accepts_everything() {
        let notification = Notification::domain_available("owner@example.com", "example.com");
        LogOnlyDispatcher
            .dispatch(&notification)
            .await
            .expect("log only");
    }
}
