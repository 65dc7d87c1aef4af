//! Source query interface.
//!
//! A [`RowSource`] runs one read-only query against a remote engine and
//! hands back its result set one page at a time. The extractor hides the
//! paging behind a record-at-a-time cursor.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::{or_placeholder, Record};

/// One result row with the source's native nullability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: Option<String>,
}

impl SourceRow {
    /// Coerce into a [`Record`], substituting placeholders for null text.
    ///
    /// A row without an id cannot be deduplicated and is rejected.
    pub fn into_record(self) -> Result<Record> {
        let id = self
            .id
            .ok_or_else(|| anyhow!("source row has no id (title: {:?})", self.title))?;
        Ok(Record {
            id,
            title: or_placeholder(self.title),
            url: or_placeholder(self.url),
            score: self.score,
            timestamp: self.timestamp,
            kind: or_placeholder(self.kind),
        })
    }
}

/// Continuation handle for the next page of a running query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub job_id: String,
    pub location: Option<String>,
    pub page_token: String,
}

/// One page of results plus the cursor to the following page, if any.
#[derive(Debug, Clone, Default)]
pub struct RowPage {
    pub rows: Vec<SourceRow>,
    pub next: Option<PageCursor>,
}

/// A remote query engine that delivers results in pages.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Submit `sql` and return the first page of at most `page_size` rows.
    async fn open(&self, sql: &str, page_size: u32) -> Result<RowPage>;

    /// Fetch the page that `cursor` points at.
    async fn next_page(&self, cursor: &PageCursor, page_size: u32) -> Result<RowPage>;
}

/// Pre-built pages served from memory, for tests and local experiments.
///
/// Optionally fails when a given page (0-based) is requested.
pub struct InMemorySource {
    pages: Vec<Vec<SourceRow>>,
    fail_on_page: Option<usize>,
    opened: AtomicUsize,
    last_sql: std::sync::Mutex<Option<String>>,
}

impl InMemorySource {
    pub fn new(pages: Vec<Vec<SourceRow>>) -> Self {
        Self {
            pages,
            fail_on_page: None,
            opened: AtomicUsize::new(0),
            last_sql: std::sync::Mutex::new(None),
        }
    }

    pub fn fail_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    /// How many times a query was opened.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// The SQL text of the last opened query.
    pub fn last_sql(&self) -> Option<String> {
        self.last_sql.lock().ok().and_then(|s| s.clone())
    }

    fn page(&self, index: usize) -> Result<RowPage> {
        if self.fail_on_page == Some(index) {
            bail!("injected failure fetching page {}", index);
        }
        let rows = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.pages.len()).then(|| PageCursor {
            job_id: "in-memory".to_string(),
            location: None,
            page_token: (index + 1).to_string(),
        });
        Ok(RowPage { rows, next })
    }
}

#[async_trait]
impl RowSource for InMemorySource {
    async fn open(&self, sql: &str, _page_size: u32) -> Result<RowPage> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_sql.lock() {
            *last = Some(sql.to_string());
        }
        self.page(0)
    }

    async fn next_page(&self, cursor: &PageCursor, _page_size: u32) -> Result<RowPage> {
        let index: usize = cursor.page_token.parse()?;
        self.page(index)
    }
}
