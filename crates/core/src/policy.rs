use crate::types::{DomainStatus, UserPreference, WatchedDomain};

/// Decides whether a completed check warrants a "became available" notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationPolicy;

impl NotificationPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` when the check represents a genuine transition into
    /// availability that the domain owner opted into.
    ///
    /// `previous` is the status of the check record immediately preceding the
    /// one just written; `None` means no such record exists and counts as
    /// not-available.
    pub fn is_candidate(
        &self,
        domain: &WatchedDomain,
        previous: Option<DomainStatus>,
        current: DomainStatus,
    ) -> bool {
        self.transition_reason(domain, previous, current).is_none()
    }

    /// Evaluates the full rule, including the owner's notification preference.
    pub fn evaluate(
        &self,
        domain: &WatchedDomain,
        previous: Option<DomainStatus>,
        current: DomainStatus,
        preference: Option<&UserPreference>,
    ) -> NotificationDecision {
        if let Some(reason) = self.transition_reason(domain, previous, current) {
            return NotificationDecision::Skip(reason);
        }

        match preference {
            None => NotificationDecision::Skip(SkipReason::ProfileMissing),
            Some(pref) if !pref.notifications_enabled => {
                NotificationDecision::Skip(SkipReason::UserOptedOut)
            }
            Some(pref) if pref.email.trim().is_empty() => {
                NotificationDecision::Skip(SkipReason::NoContactAddress)
            }
            Some(_) => NotificationDecision::Notify,
        }
    }

    fn transition_reason(
        &self,
        domain: &WatchedDomain,
        previous: Option<DomainStatus>,
        current: DomainStatus,
    ) -> Option<SkipReason> {
        if !current.is_available() {
            return Some(SkipReason::NotAvailable);
        }
        if previous.is_some_and(DomainStatus::is_available) {
            return Some(SkipReason::NoTransition);
        }
        if !domain.notify_if_available {
            return Some(SkipReason::DomainOptedOut);
        }
        None
    }
}

/// Outcome of a notification policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationDecision {
    Notify,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAvailable,
    NoTransition,
    DomainOptedOut,
    ProfileMissing,
    UserOptedOut,
    NoContactAddress,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAvailable => "not_available",
            Self::NoTransition => "no_transition",
            Self::DomainOptedOut => "domain_opted_out",
            Self::ProfileMissing => "profile_missing",
            Self::UserOptedOut => "user_opted_out",
            Self::NoContactAddress => "no_contact_address",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn domain(notify: bool) -> WatchedDomain {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        WatchedDomain {
            id: 1,
            user_id: "user-1".to_string(),
            domain: "example.com".to_string(),
            status: DomainStatus::Taken,
            last_checked: Some(ts),
            notify_if_available: notify,
            notes: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    fn enabled() -> UserPreference {
        UserPreference {
            email: "owner@example.com".to_string(),
            notifications_enabled: true,
        }
    }

    #[test]
    fn notifies_on_taken_to_available() {
        let decision = NotificationPolicy::new().evaluate(
            &domain(true),
            Some(DomainStatus::Taken),
            DomainStatus::Available,
            Some(&enabled()),
        );
        assert_eq!(decision, NotificationDecision::Notify);
    }

    #[test]
    fn repeat_availability_is_not_a_transition() {
        let decision = NotificationPolicy::new().evaluate(
            &domain(true),
            Some(DomainStatus::Available),
            DomainStatus::Available,
            Some(&enabled()),
        );
        assert_eq!(decision, NotificationDecision::Skip(SkipReason::NoTransition));
    }

    #[test]
    fn missing_history_counts_as_not_available() {
        let policy = NotificationPolicy::new();
        assert!(policy.is_candidate(&domain(true), None, DomainStatus::Available));
        assert!(policy.is_candidate(
            &domain(true),
            Some(DomainStatus::Unknown),
            DomainStatus::Available
        ));
    }

    #[test]
    fn respects_domain_and_user_opt_out() {
        let policy = NotificationPolicy::new();
        let decision = policy.evaluate(
            &domain(false),
            Some(DomainStatus::Taken),
            DomainStatus::Available,
            Some(&enabled()),
        );
        assert_eq!(decision, NotificationDecision::Skip(SkipReason::DomainOptedOut));

        let disabled = UserPreference {
            notifications_enabled: false,
            ..enabled()
        };
        let decision = policy.evaluate(
            &domain(true),
            Some(DomainStatus::Taken),
            DomainStatus::Available,
            Some(&disabled),
        );
        assert_eq!(decision, NotificationDecision::Skip(SkipReason::UserOptedOut));

        let decision = policy.evaluate(
            &domain(true),
            Some(DomainStatus::Taken),
            DomainStatus::Available,
            None,
        );
        assert_eq!(decision, NotificationDecision::Skip(SkipReason::ProfileMissing));
    }

    #[test]
    fn non_available_results_never_notify() {
        let policy = NotificationPolicy::new();
        for current in [DomainStatus::Taken, DomainStatus::Unknown, DomainStatus::Pending] {
            let decision =
                policy.evaluate(&domain(true), Some(DomainStatus::Taken), current, Some(&enabled()));
            assert_eq!(decision, NotificationDecision::Skip(SkipReason::NotAvailable));
        }
    }
}
