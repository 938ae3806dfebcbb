//! The network seam: one GET in, status and body out.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;

use crate::config::ClientConfig;
use crate::error::{PermanentError, Result, TransientError, TriError};

/// A raw HTTP response, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, when given in seconds.
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// Issues a single GET request. Implementations must not retry; the client
/// owns the retry policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the response for any HTTP status. Only failures to obtain a
    /// response at all are errors.
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a `reqwest::Client` carrying the configured headers and timeout.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tritoolkit/", env!("TRI_VERSION")))
            .default_headers(config.headers().clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                PermanentError::InvalidRequest(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[tracing::instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        debug!("GET {}...", url);

        let response = self.client.get(url).send().await.map_err(send_error)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(send_error)?;

        debug!("GET {} -> HTTP {} ({} bytes)", url, status, body.len());

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Maps a reqwest failure (no usable response) to a transient error.
fn send_error(error: reqwest::Error) -> TriError {
    let msg = error.to_string();
    if error.is_timeout() {
        TransientError::Timeout(msg).into()
    } else if error.is_connect() {
        TransientError::Connect(msg).into()
    } else if error.is_builder() {
        PermanentError::InvalidRequest(msg).into()
    } else {
        TransientError::Network(msg).into()
    }
}

/// Only the delay-seconds form is understood; HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
