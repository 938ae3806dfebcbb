//! Envirofacts client: URL construction, retry and response decoding.

use log::debug;
use reqwest::Url;
use serde_json::Value;

use super::retry::{classify_response, with_retry};
use super::transport::{HttpResponse, ReqwestTransport, Transport};
use crate::config::{ClientConfig, ResponseFormat};
use crate::error::{PermanentError, Result};
use crate::frame::Frame;
use crate::query::{Filter, is_identifier};
use crate::table::Table;

/// Column holding the row count in `/COUNT/JSON` responses.
const COUNT_COLUMN: &str = "TOTALQUERYRESULTS";

/// One page of rows as returned by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub frame: Frame,
    /// Whether the server says more rows follow. Envirofacts does not send
    /// one, so responses from it always carry `None`.
    pub has_more: Option<bool>,
}

/// Client for the Envirofacts Data Service.
///
/// The configuration is fixed at construction; failed requests never alter
/// it, so one client can serve any number of [`Table`] handles.
pub struct TriApiClient<T = ReqwestTransport> {
    config: ClientConfig,
    transport: T,
}

impl TriApiClient<ReqwestTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::from_config(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Client configured from `TRI_BASE_URL` and `TRI_API_TOKEN`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env(|key| std::env::var(key).ok())?)
    }
}

impl<T: Transport> TriApiClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// A handle on one TRI table, borrowing this client.
    pub fn table(&self, name: &str) -> Table<'_, T> {
        Table::new(self, name)
    }

    /// `{base}/{TABLE}/{filter segments...}` with every segment
    /// percent-encoded.
    pub fn table_url(&self, table: &str, filter: &Filter) -> Result<Url> {
        let table = normalize_table(table)?;
        let mut segments = vec![table];
        segments.extend(filter.to_segments()?);
        self.url(&segments)
    }

    /// Fetches rows `offset..offset + limit` of the filtered table.
    #[tracing::instrument(skip(self, filter))]
    pub async fn request(
        &self,
        table: &str,
        filter: &Filter,
        offset: u64,
        limit: u64,
    ) -> Result<Page> {
        if limit == 0 {
            return Err(PermanentError::InvalidRequest("limit must be positive".into()).into());
        }
        let last = offset.checked_add(limit - 1).ok_or_else(|| {
            PermanentError::InvalidRequest(format!("Row window {}+{} overflows", offset, limit))
        })?;

        let url = self.window_url(table, filter, offset, last)?;
        let response = self.fetch("Fetching rows", url.as_str()).await?;
        let frame = self.decode(&response.body)?;

        debug!(
            "{} rows {}..={}: received {} rows",
            table,
            offset,
            last,
            frame.len()
        );

        Ok(Page {
            frame,
            has_more: None,
        })
    }

    /// Fetches the inclusive row window `first..=last` without filtering.
    #[tracing::instrument(skip(self))]
    pub async fn row_range(&self, table: &str, first: u64, last: u64) -> Result<Frame> {
        if last < first {
            return Err(PermanentError::InvalidRequest(format!(
                "Row range {}:{} is empty",
                first, last
            ))
            .into());
        }
        let url = self.window_url(table, &Filter::new(), first, last)?;
        let response = self.fetch("Fetching row range", url.as_str()).await?;
        self.decode(&response.body)
    }

    /// Number of rows matching `filter`.
    #[tracing::instrument(skip(self, filter))]
    pub async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        let mut url = self.table_url(table, filter)?;
        push_segments(&mut url, &["COUNT", "JSON"])?;

        let response = self.fetch("Counting rows", url.as_str()).await?;
        let frame = Frame::from_json_rows(&response.body)?;
        parse_count(&frame)
    }

    fn window_url(&self, table: &str, filter: &Filter, first: u64, last: u64) -> Result<Url> {
        let mut url = self.table_url(table, filter)?;
        let window = format!("{}:{}", first, last);
        push_segments(
            &mut url,
            &["rows", window.as_str(), self.config.format().segment()],
        )?;
        Ok(url)
    }

    fn url(&self, segments: &[String]) -> Result<Url> {
        let mut url = Url::parse(self.config.base_url()).map_err(|e| {
            PermanentError::InvalidRequest(format!(
                "Invalid base URL {}: {}",
                self.config.base_url(),
                e
            ))
        })?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        push_segments(&mut url, &segments)?;
        Ok(url)
    }

    /// One logical GET: transport call plus classification, retried per the
    /// configured policy.
    async fn fetch(&self, operation_name: &str, url: &str) -> Result<HttpResponse> {
        debug!("{}: GET {}", operation_name, url);

        with_retry(
            operation_name,
            self.config.max_retries(),
            self.config.backoff(),
            || async {
                let response = self.transport.get(url).await?;
                classify_response(url, response)
            },
        )
        .await
    }

    fn decode(&self, body: &str) -> Result<Frame> {
        match self.config.format() {
            ResponseFormat::Json => Frame::from_json_rows(body),
            ResponseFormat::Csv => Frame::from_csv(body),
        }
    }
}

/// Upper-cases and validates a table name.
pub(crate) fn normalize_table(table: &str) -> Result<String> {
    let name = table.trim().to_ascii_uppercase();
    if !is_identifier(&name) {
        return Err(PermanentError::InvalidTable(table.to_string()).into());
    }
    Ok(name)
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<()> {
    let base = url.to_string();
    url.path_segments_mut()
        .map_err(|_| PermanentError::InvalidRequest(format!("Base URL cannot take a path: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(())
}

fn parse_count(frame: &Frame) -> Result<u64> {
    let value = frame
        .row(0)
        .and_then(|row| row.get(COUNT_COLUMN))
        .ok_or_else(|| PermanentError::Decode(format!("Count response lacks {}", COUNT_COLUMN)))?;

    let count = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    count.ok_or_else(|| PermanentError::Decode(format!("Invalid row count: {}", value)).into())
}
