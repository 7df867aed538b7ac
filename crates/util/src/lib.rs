//! Process-level configuration for the domain-watch binaries.

pub mod config;

pub use config::{AppConfig, ConfigError, Environment, MailConfig};

/// Reads `.env` into the process environment. Deployments without the file
/// rely on the real environment only.
pub fn load_env_file() {
    dotenvy::dotenv().ok();
}

/// Serializes tests that mutate process environment variables.
#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
