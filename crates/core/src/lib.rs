pub mod normalizer;
pub mod policy;
pub mod ports;
pub mod types;

pub use normalizer::{DomainName, ValidationError};
pub use types::{
    CheckRecord, CheckResult, CycleReport, DomainStatus, ProbeOutcome, UserPreference,
    WatchedDomain,
};
