use std::{env, fmt, net::SocketAddr, time::Duration};

use url::Url;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://domain-watch.db";
pub const DEFAULT_WHOIS_API_URL: &str = "https://whois-api.example.com/";
pub const DEFAULT_MAIL_FROM: &str = "alerts@domain-watch.local";
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CHECK_BATCH_LIMIT: u32 = 50;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Outbound e-mail delivery settings. Absent when `MAIL_API_URL` is unset.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub from: String,
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub whois_api_url: Url,
    pub mail: Option<MailConfig>,
    pub service_token: Option<String>,
    pub auth_jwt_secret: Option<String>,
    pub probe_timeout: Duration,
    pub check_batch_limit: u32,
    pub check_max_concurrency: Option<usize>,
    pub check_cycle_budget: Option<Duration>,
    pub history_retention_days: Option<u32>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = optional_var("APP_BIND_ADDR")
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDR)
            .parse::<SocketAddr>()
            .map_err(ConfigError::BindAddress)?;

        let database_url =
            optional_var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let whois_api_url = parse_url(
            "WHOIS_API_URL",
            &optional_var("WHOIS_API_URL").unwrap_or_else(|| DEFAULT_WHOIS_API_URL.to_string()),
        )?;

        let mail = match optional_var("MAIL_API_URL") {
            Some(raw) => Some(MailConfig {
                endpoint: parse_url("MAIL_API_URL", &raw)?,
                api_key: optional_var("MAIL_API_KEY"),
                from: optional_var("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            }),
            None => None,
        };

        let service_token = optional_var("SERVICE_TOKEN");
        let auth_jwt_secret = optional_var("AUTH_JWT_SECRET");
        if environment.is_production() {
            if service_token.is_none() {
                return Err(ConfigError::Missing("SERVICE_TOKEN"));
            }
            if auth_jwt_secret.is_none() {
                return Err(ConfigError::Missing("AUTH_JWT_SECRET"));
            }
        }

        let probe_timeout = Duration::from_secs(
            parse_number::<u64>("PROBE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
        );
        let check_batch_limit =
            parse_number::<u32>("CHECK_BATCH_LIMIT")?.unwrap_or(DEFAULT_CHECK_BATCH_LIMIT);
        let check_max_concurrency =
            parse_number::<usize>("CHECK_MAX_CONCURRENCY")?.filter(|value| *value > 0);
        let check_cycle_budget = parse_number::<u64>("CHECK_CYCLE_BUDGET_SECS")?
            .filter(|value| *value > 0)
            .map(Duration::from_secs);
        let history_retention_days =
            parse_number::<u32>("CHECK_HISTORY_RETENTION_DAYS")?.filter(|value| *value > 0);

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            whois_api_url,
            mail,
            service_token,
            auth_jwt_secret,
            probe_timeout,
            check_batch_limit,
            check_max_concurrency,
            check_cycle_budget,
            history_retention_days,
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match optional_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        None => Ok(None),
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { key, source })
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    Missing(&'static str),
    InvalidNumber { key: &'static str, value: String },
    InvalidUrl { key: &'static str, source: url::ParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::Missing(key) => write!(f, "{key} must be set in production"),
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer (got {value})")
            }
            Self::InvalidUrl { key, source } => write!(f, "invalid {key} value: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ENV_GUARD;

    const KEYS: &[&str] = &[
        "APP_ENV",
        "APP_BIND_ADDR",
        "DATABASE_URL",
        "WHOIS_API_URL",
        "MAIL_API_URL",
        "MAIL_API_KEY",
        "MAIL_FROM",
        "SERVICE_TOKEN",
        "AUTH_JWT_SECRET",
        "PROBE_TIMEOUT_SECS",
        "CHECK_BATCH_LIMIT",
        "CHECK_MAX_CONCURRENCY",
        "CHECK_CYCLE_BUDGET_SECS",
        "CHECK_HISTORY_RETENTION_DAYS",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.whois_api_url.as_str(), DEFAULT_WHOIS_API_URL);
        assert!(config.mail.is_none());
        assert_eq!(config.probe_timeout, Duration::from_secs(10));
        assert_eq!(config.check_batch_limit, 50);
        assert_eq!(config.check_max_concurrency, None);
        assert_eq!(config.check_cycle_budget, None);
        assert_eq!(config.history_retention_days, None);
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn production_requires_secrets() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("SERVICE_TOKEN", "svc");

        let err = AppConfig::from_env().expect_err("missing secret should error");
        assert!(matches!(err, ConfigError::Missing("AUTH_JWT_SECRET")));

        env::set_var("AUTH_JWT_SECRET", "jwt-secret");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.service_token.as_deref(), Some("svc"));

        clear_env();
    }

    #[test]
    fn parses_check_and_mail_settings() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("MAIL_API_URL", "https://mail.example.com/send");
        env::set_var("MAIL_API_KEY", "key");
        env::set_var("CHECK_BATCH_LIMIT", "10");
        env::set_var("CHECK_MAX_CONCURRENCY", "4");
        env::set_var("CHECK_CYCLE_BUDGET_SECS", "30");
        env::set_var("CHECK_HISTORY_RETENTION_DAYS", "90");

        let config = AppConfig::from_env().expect("config should load");
        let mail = config.mail.expect("mail configured");
        assert_eq!(mail.endpoint.as_str(), "https://mail.example.com/send");
        assert_eq!(mail.api_key.as_deref(), Some("key"));
        assert_eq!(mail.from, DEFAULT_MAIL_FROM);
        assert_eq!(config.check_batch_limit, 10);
        assert_eq!(config.check_max_concurrency, Some(4));
        assert_eq!(config.check_cycle_budget, Some(Duration::from_secs(30)));
        assert_eq!(config.history_retention_days, Some(90));

        clear_env();
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_BIND_ADDR", "localhost");

        let err = AppConfig::from_env().expect_err("bad address should error");
        assert!(matches!(err, ConfigError::BindAddress(_)));

        clear_env();
    }

    #[test]
    fn rejects_malformed_numbers() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("PROBE_TIMEOUT_SECS", "soon");

        let err = AppConfig::from_env().expect_err("bad number should error");
        assert!(matches!(
            err,
            ConfigError::InvalidNumber { key: "PROBE_TIMEOUT_SECS", .. }
        ));

        clear_env();
    }
}
