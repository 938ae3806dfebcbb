//! Client configuration: endpoint, credentials, timeout and retry policy.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use rand::Rng;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::error::{PermanentError, Result};

/// Public Envirofacts Data Service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://data.epa.gov/efservice";

/// Number of additional attempts after the first one fails transiently.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Rows requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 10_000;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "TRI_BASE_URL";

/// Environment variable holding an optional bearer credential.
pub const API_TOKEN_ENV: &str = "TRI_API_TOKEN";

/// Payload format requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Json,
    Csv,
}

impl ResponseFormat {
    /// Trailing path segment selecting this format.
    pub fn segment(self) -> &'static str {
        match self {
            ResponseFormat::Json => "JSON",
            ResponseFormat::Csv => "CSV",
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseFormat::Json => write!(f, "json"),
            ResponseFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ResponseFormat::Json),
            "csv" => Ok(ResponseFormat::Csv),
            _ => anyhow::bail!("Unknown response format: {}. Expected json or csv.", s),
        }
    }
}

/// Exponential backoff between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: u32,
    pub max: Duration,
    /// Draw each delay uniformly from `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 2,
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// A policy that never sleeps. Useful in tests.
    pub fn immediate() -> Self {
        Self {
            initial: Duration::ZERO,
            multiplier: 1,
            max: Duration::ZERO,
            jitter: false,
        }
    }

    /// Upper bound of the delay before retry `retry` (1-based).
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exp);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Delay before retry `retry` (1-based). A server-provided hint wins
    /// over the computed delay but is still capped at `max`.
    pub fn delay(&self, retry: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.min(self.max);
        }

        let delay = self.base_delay(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let half = delay / 2;
        rand::thread_rng().gen_range(half..=delay)
    }
}

/// Immutable connection settings shared by every table accessor.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    max_retries: u32,
    backoff: BackoffPolicy,
    format: ResponseFormat,
    page_size: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffPolicy::default(),
            format: ResponseFormat::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Builds a configuration from `TRI_BASE_URL` and `TRI_API_TOKEN`,
    /// looked up through `lookup` so callers can substitute the environment.
    pub fn from_env<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(url) = lookup(BASE_URL_ENV) {
            builder = builder.base_url(url);
        }
        if let Some(token) = lookup(API_TOKEN_ENV) {
            builder = builder.bearer_token(&token)?;
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }
}

#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    /// Adds an `Authorization: Bearer` header. The value is marked sensitive
    /// so it never shows up in debug output.
    pub fn bearer_token(mut self, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            PermanentError::InvalidRequest("API token contains invalid characters".into())
        })?;
        value.set_sensitive(true);
        self.config.headers.insert(AUTHORIZATION, value);
        debug!("Using {} for authentication", API_TOKEN_ENV);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.backoff = backoff;
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn page_size(mut self, page_size: u64) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let mut config = self.config;

        let trimmed = config.base_url.trim_end_matches('/');
        if reqwest::Url::parse(trimmed).is_err() {
            return Err(
                PermanentError::InvalidRequest(format!("Invalid base URL: {}", config.base_url))
                    .into(),
            );
        }
        config.base_url = trimmed.to_string();

        if config.page_size == 0 {
            return Err(PermanentError::InvalidRequest("Page size must be positive".into()).into());
        }

        Ok(config)
    }
}
