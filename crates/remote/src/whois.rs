use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;
use url::Url;

use domain_watch_core::ports::AvailabilityProber;
use domain_watch_core::types::{DomainStatus, ProbeOutcome};

/// Client for the third-party registry lookup API.
///
/// Issues `GET {base_url}/check?domain=<name>` and expects a JSON body with a
/// boolean `available` field.
#[derive(Clone)]
pub struct WhoisClient {
    http: Client,
    base_url: Url,
}

impl WhoisClient {
    /// Creates a new client with the provided HTTP instance and base URL.
    ///
    /// The base path is treated as a directory: `https://host/api` and
    /// `https://host/api/` both resolve lookups under `/api/check`.
    pub fn new(mut base_url: Url, http: Client) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url }
    }

    /// Builds a client whose requests are bounded by `timeout`.
    pub fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(base_url, http))
    }

    /// Performs the raw lookup. Errors are surfaced to the caller.
    pub async fn lookup(&self, domain: &str) -> Result<Value, LookupError> {
        let mut url = self.base_url.join("check")?;
        url.query_pairs_mut().append_pair("domain", domain);

        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status { status });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl AvailabilityProber for WhoisClient {
    async fn probe(&self, domain: &str) -> ProbeOutcome {
        match self.lookup(domain).await {
            Ok(body) => {
                let available = body.get("available").and_then(Value::as_bool) == Some(true);
                let status = if available {
                    DomainStatus::Available
                } else {
                    DomainStatus::Taken
                };
                ProbeOutcome::new(status, body)
            }
            Err(err) => {
                warn!(stage = "probe", %domain, error = %err, "availability lookup failed");
                ProbeOutcome::new(DomainStatus::Unknown, err.details())
            }
        }
    }
}

/// Errors produced by the lookup client.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API call failed with status {status}")]
    Status { status: StatusCode },
}

impl LookupError {
    /// Diagnostic payload persisted with an `unknown` check record.
    pub fn details(&self) -> Value {
        match self {
            Self::Status { status } => json!({
                "error": "API call failed",
                "statusCode": status.as_u16(),
            }),
            Self::Http(err) if err.is_timeout() => json!({
                "error": "request timed out",
            }),
            other => json!({ "error": other.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> WhoisClient {
        let base = Url::parse(&server.url("/api/")).expect("url");
        WhoisClient::with_timeout(base, Duration::from_millis(500)).expect("client")
    }

    #[tokio::test]
    async fn available_response_maps_to_available() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/check")
                    .query_param("domain", "example-unlikely-12345.com");
                then.status(200)
                    .json_body(json!({ "available": true, "registrar": null }));
            })
            .await;

        let outcome = client(&server).probe("example-unlikely-12345.com").await;
        mock.assert_async().await;

        assert_eq!(outcome.status, DomainStatus::Available);
        assert_eq!(outcome.details["available"], json!(true));
    }

    #[tokio::test]
    async fn registered_response_maps_to_taken() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/check");
                then.status(200)
                    .json_body(json!({ "available": false, "registrar": "Example Registrar" }));
            })
            .await;

        let outcome = client(&server).probe("example.com").await;
        assert_eq!(outcome.status, DomainStatus::Taken);
        assert_eq!(outcome.details["registrar"], json!("Example Registrar"));
    }

    #[tokio::test]
    async fn error_status_maps_to_unknown_with_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/check");
                then.status(503).body("maintenance");
            })
            .await;

        let outcome = client(&server).probe("example.com").await;
        assert_eq!(outcome.status, DomainStatus::Unknown);
        assert_eq!(
            outcome.details,
            json!({ "error": "API call failed", "statusCode": 503 })
        );
    }

    #[tokio::test]
    async fn malformed_body_maps_to_unknown() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/check");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let outcome = client(&server).probe("example.com").await;
        assert_eq!(outcome.status, DomainStatus::Unknown);
        assert!(outcome.details["error"].is_string());
    }

    #[tokio::test]
    async fn slow_upstream_times_out_as_unknown() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/check");
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .json_body(json!({ "available": true }));
            })
            .await;

        let outcome = client(&server).probe("example.com").await;
        assert_eq!(outcome.status, DomainStatus::Unknown);
        assert_eq!(outcome.details, json!({ "error": "request timed out" }));
    }

    #[tokio::test]
    async fn base_path_without_trailing_slash_is_kept() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/check");
                then.status(200).json_body(json!({ "available": false }));
            })
            .await;
        let base = Url::parse(&server.url("/api")).expect("url");
        let client = WhoisClient::with_timeout(base, Duration::from_millis(500)).expect("client");

        let outcome = client.probe("example.com").await;
        mock.assert_async().await;
        assert_eq!(outcome.status, DomainStatus::Taken);
    }

    #[tokio::test]
    async fn unreachable_host_maps_to_unknown() {
        let base = Url::parse("http://127.0.0.1:9/").expect("url");
        let client = WhoisClient::with_timeout(base, Duration::from_millis(500)).expect("client");

        let outcome = client.probe("example.com").await;
        assert_eq!(outcome.status, DomainStatus::Unknown);
    }
}
