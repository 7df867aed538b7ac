//! Outbound capabilities the check engine depends on.
//!
//! Concrete HTTP adapters live in the `domain-watch-remote` crate; tests use
//! in-process doubles.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::ProbeOutcome;

/// Answers "is this domain registered?" for a single name.
///
/// Implementations must not fail: transport errors, timeouts and bad
/// responses are reported as an `unknown` [`ProbeOutcome`] with diagnostics.
#[async_trait]
pub trait AvailabilityProber: Send + Sync {
    async fn probe(&self, domain: &str) -> ProbeOutcome;
}

/// Message handed to a [`NotificationDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Builds the "domain is now available" message for `domain`.
    pub fn domain_available(to: impl Into<String>, domain: &str) -> Self {
        Self {
            to: to.into(),
            subject: format!("{domain} is now available"),
            body: format!(
                "Good news! The domain {domain} on your watchlist appears to be available for registration.\n\nRegister it soon before someone else does."
            ),
        }
    }
}

/// Delivers notifications to an external channel such as e-mail.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError>;
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
