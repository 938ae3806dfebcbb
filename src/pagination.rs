//! Offset pagination as an explicit state machine.
//!
//! `Idle -> Fetching(0) -> Fetching(k) -> ... -> Complete`, or `Failed` from
//! any fetching state. The table accessor drives it; it performs no I/O.

use crate::error::{PermanentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Idle,
    /// Waiting on the page that starts at `offset`.
    Fetching { offset: u64 },
    Complete { total_rows: u64 },
    Failed { offset: u64 },
}

/// Drives one paginated scan with a fixed page size.
#[derive(Debug, Clone)]
pub struct Paginator {
    page_size: u64,
    state: PageState,
}

impl Paginator {
    /// A zero page size would never advance, so it is rejected.
    pub fn new(page_size: u64) -> Result<Self> {
        if page_size == 0 {
            return Err(
                PermanentError::InvalidRequest("Page size must be at least 1".into()).into(),
            );
        }
        Ok(Self {
            page_size,
            state: PageState::Idle,
        })
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Moves from `Idle` to fetching the first page. Returns its offset.
    pub fn start(&mut self) -> u64 {
        if self.state == PageState::Idle {
            self.state = PageState::Fetching { offset: 0 };
        }
        self.current_offset()
    }

    /// Offset of the page being fetched, or where the scan stopped.
    pub fn current_offset(&self) -> u64 {
        match self.state {
            PageState::Idle => 0,
            PageState::Fetching { offset } | PageState::Failed { offset } => offset,
            PageState::Complete { total_rows } => total_rows,
        }
    }

    /// Records a received page of `rows` rows. `has_more` is the server's
    /// continuation indicator when it sends one. Without it, only a full page
    /// means more rows may follow; a page larger than requested means the
    /// server ignored the row window and already sent everything. Returns the
    /// next offset to fetch, or `None` once the scan is complete.
    pub fn advance(&mut self, rows: u64, has_more: Option<bool>) -> Option<u64> {
        let PageState::Fetching { offset } = self.state else {
            return None;
        };

        let next = offset + rows;
        let more = match has_more {
            Some(more) => more && rows > 0,
            None => rows == self.page_size,
        };

        if more {
            self.state = PageState::Fetching { offset: next };
            Some(next)
        } else {
            self.state = PageState::Complete { total_rows: next };
            None
        }
    }

    pub fn fail(&mut self) {
        if let PageState::Fetching { offset } = self.state {
            self.state = PageState::Failed { offset };
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            PageState::Complete { .. } | PageState::Failed { .. }
        )
    }
}
