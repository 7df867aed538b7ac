use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use url::Url;

use domain_watch_core::ports::{DispatchError, Notification, NotificationDispatcher};

/// Client for an HTTP e-mail delivery API.
#[derive(Clone)]
pub struct MailClient {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
    from: String,
}

impl MailClient {
    /// Creates a new client posting to `endpoint` as sender `from`.
    pub fn new(endpoint: Url, api_key: Option<String>, from: impl Into<String>, http: Client) -> Self {
        Self {
            http,
            endpoint,
            api_key,
            from: from.into(),
        }
    }
}

#[derive(Serialize)]
struct MailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl NotificationDispatcher for MailClient {
    async fn dispatch(&self, notification: &Notification) -> Result<(), DispatchError> {
        let payload = MailMessage {
            from: &self.from,
            to: &notification.to,
            subject: &notification.subject,
            text: &notification.body,
        };

        let mut request = self.http.post(self.endpoint.clone()).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| DispatchError::Transport(err.to_string()))?;

        ensure_success(response).await
    }
}

async fn ensure_success(response: Response) -> Result<(), DispatchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(DispatchError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}
