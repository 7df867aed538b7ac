use std::fmt;

use thiserror::Error;

const MAX_LABEL_LEN: usize = 63;

/// Errors raised when a user-submitted domain name cannot be watched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please enter a domain")]
    Empty,
    #[error("'{0}' is not a valid domain (e.g., example.com)")]
    InvalidDomain(String),
}

/// A domain name that passed normalization and syntax validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainName(String);

impl DomainName {
    /// Normalizes raw user input into a watchable domain name.
    ///
    /// The input is trimmed and lowercased, a leading `http://`/`https://`
    /// scheme and a leading `www.` are removed, and the remainder must be at
    /// least two dot-separated labels of `[a-z0-9]` with internal hyphens.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let lowered = raw.trim().to_ascii_lowercase();
        let without_scheme = lowered
            .strip_prefix("https://")
            .or_else(|| lowered.strip_prefix("http://"))
            .unwrap_or(&lowered);
        let cleaned = without_scheme
            .strip_prefix("www.")
            .unwrap_or(without_scheme);

        if cleaned.is_empty() {
            return Err(ValidationError::Empty);
        }

        if !is_valid_domain(cleaned) {
            return Err(ValidationError::InvalidDomain(cleaned.to_string()));
        }

        Ok(Self(cleaned.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_valid_domain(candidate: &str) -> bool {
    let labels: Vec<&str> = candidate.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| is_valid_label(label))
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };

    bytes.len() <= MAX_LABEL_LEN
        && first.is_ascii_alphanumeric()
        && last.is_ascii_alphanumeric()
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}
