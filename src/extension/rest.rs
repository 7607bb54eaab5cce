//! REST extension server client
//!
//! `GET {url}/ext/commands` lists the served extensions and
//! `POST {url}/ext/command` runs one.

use super::{ExtensionDispatcher, ExtensionError, ExtensionRequest, ExtensionResponse};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;

pub struct RestDispatcher {
    client: Client,
    base_url: String,
    token: Option<String>,
    retry_base: Duration,
}

impl RestDispatcher {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ExtensionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtensionError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            retry_base: Duration::from_secs(1),
        })
    }

    /// Delay before the first retry; doubles for each further attempt
    pub fn with_retry_base(mut self, delay: Duration) -> Self {
        self.retry_base = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base * (1 << (attempt - 1))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> ExtensionError {
        match status.as_u16() {
            500..=599 => ExtensionError::server_error(format!("Server error: HTTP {status}: {body}")),
            _ => ExtensionError::rejected(format!("HTTP {status}: {body}")),
        }
    }

    async fn send_once<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ExtensionError> {
        let response = self.authorize(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                ExtensionError::timeout(format!("Request timeout: {e}"))
            } else {
                ExtensionError::transport(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExtensionError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ExtensionError::malformed(format!("Failed to parse response: {e} - body: {body}"))
        })
    }

    /// Send the request built by `build`, retrying retryable failures
    async fn send<T, F>(&self, build: F) -> Result<T, ExtensionError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            match self.send_once(build(&self.client)).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = self.retry_delay(attempt);
                    tracing::warn!(
                        url = %self.base_url,
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Extension call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ExtensionDispatcher for RestDispatcher {
    async fn commands(&self) -> Result<Vec<String>, ExtensionError> {
        let url = format!("{}/ext/commands", self.base_url);
        self.send(|client| client.get(&url)).await
    }

    async fn dispatch(&self, request: &ExtensionRequest) -> Result<ExtensionResponse, ExtensionError> {
        let url = format!("{}/ext/command", self.base_url);
        tracing::debug!(url = %url, extension = %request.extension, "Dispatching extension");
        self.send(|client| client.post(&url).json(request)).await
    }
}
