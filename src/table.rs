//! Single-table query interface.

use std::collections::BTreeSet;

use log::{debug, info};
use serde_json::Value;

use crate::error::{PermanentError, Result, StateError};
use crate::frame::Frame;
use crate::http::client::normalize_table;
use crate::http::{ReqwestTransport, Transport, TriApiClient};
use crate::pagination::Paginator;
use crate::query::Filter;

/// A handle on one TRI table.
///
/// Each [`Table::filter`] call runs an independent paginated scan; the last
/// successful result is kept for [`Table::column`].
pub struct Table<'a, T = ReqwestTransport> {
    client: &'a TriApiClient<T>,
    name: String,
    known_columns: Option<BTreeSet<String>>,
    page_size: Option<u64>,
    last: Option<Frame>,
}

impl<'a, T: Transport> Table<'a, T> {
    /// The name is upper-cased but only validated when a request is made.
    pub fn new(client: &'a TriApiClient<T>, name: &str) -> Self {
        Self {
            client,
            name: name.trim().to_ascii_uppercase(),
            known_columns: None,
            page_size: None,
            last: None,
        }
    }

    /// Restricts filters to these columns; anything else is rejected before
    /// a request is sent.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_columns = Some(
            columns
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .collect(),
        );
        self
    }

    /// Overrides the client's page size for this table. Zero is rejected
    /// when the next [`Table::filter`] runs.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
            .unwrap_or_else(|| self.client.config().page_size())
    }

    /// Fetches every row matching `filter`, page by page, and caches the
    /// assembled frame. An empty filter scans the whole table.
    ///
    /// Errors abort the scan and leave the previous cached result in place.
    #[tracing::instrument(skip(self, filter), fields(table = %self.name))]
    pub async fn filter(&mut self, filter: &Filter) -> Result<&Frame> {
        self.validate(filter)?;

        let mut paginator = Paginator::new(self.page_size())?;
        let limit = paginator.page_size();
        let mut offset = paginator.start();
        let mut frame = Frame::new();

        loop {
            let page = match self.client.request(&self.name, filter, offset, limit).await {
                Ok(page) => page,
                Err(e) => {
                    paginator.fail();
                    debug!(
                        "{}: scan failed at offset {} ({})",
                        self.name, offset, e
                    );
                    return Err(e);
                }
            };

            let received = page.frame.len() as u64;
            frame.append(page.frame);

            match paginator.advance(received, page.has_more) {
                Some(next) => offset = next,
                None => break,
            }
        }

        info!("{}: fetched {} rows", self.name, frame.len());
        Ok(&*self.last.insert(frame))
    }

    /// Values of `column` from the last successful [`Table::filter`].
    pub fn column(&self, column: &str) -> Result<Vec<&Value>> {
        let frame = self.last.as_ref().ok_or(StateError::NoResult)?;
        frame.column(column).ok_or_else(|| {
            PermanentError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            }
            .into()
        })
    }

    /// Alias of [`Table::column`].
    pub fn get(&self, column: &str) -> Result<Vec<&Value>> {
        self.column(column)
    }

    pub fn last_result(&self) -> Option<&Frame> {
        self.last.as_ref()
    }

    /// Number of rows matching `filter`, without fetching them.
    pub async fn count(&self, filter: &Filter) -> Result<u64> {
        self.validate(filter)?;
        self.client.count(&self.name, filter).await
    }

    /// Total number of rows in the table.
    pub async fn rows(&self) -> Result<u64> {
        self.count(&Filter::new()).await
    }

    /// The inclusive row window `first..=last`, unfiltered and uncached.
    pub async fn row_range(&self, first: u64, last: u64) -> Result<Frame> {
        self.client.row_range(&self.name, first, last).await
    }

    fn validate(&self, filter: &Filter) -> Result<()> {
        normalize_table(&self.name)?;

        if let Some(known) = &self.known_columns {
            if let Some(column) = filter.columns().find(|c| !known.contains(*c)) {
                return Err(PermanentError::UnknownColumn {
                    table: self.name.clone(),
                    column: column.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
