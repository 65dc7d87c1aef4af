//! Extraction: the fixed source query exposed as a lazy record cursor.
//!
//! [`Extractor::extract`] submits the query and returns an [`Extraction`],
//! which pulls one page into memory at a time and yields records one by
//! one. The cursor is finite and not restartable; after exhaustion or a
//! failure it keeps returning `Ok(None)`. Nothing is retried.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::EtlError;
use crate::models::Record;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::source::{PageCursor, RowSource, SourceRow};
use crate::stream::RecordStream;

/// Default source table.
pub const DEFAULT_SOURCE_TABLE: &str = "bigquery-public-data.hacker_news.full";

/// Build the one query the extractor ever runs: every item with a
/// non-empty title, null text columns coalesced to the placeholder.
pub fn build_query(table: &str) -> String {
    format!(
        r#"SELECT COALESCE(title, "None") AS title, COALESCE(url, "None") AS url, score, timestamp, id, type
FROM `{}`
WHERE title != """#,
        table
    )
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub table: String,
    pub page_size: u32,
    /// Emit a progress event every this many records.
    pub progress_every: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            table: DEFAULT_SOURCE_TABLE.to_string(),
            page_size: 10_000,
            progress_every: 10_000,
        }
    }
}

/// Runs the fixed query against an injected [`RowSource`].
pub struct Extractor<S> {
    source: S,
    options: ExtractOptions,
    reporter: Arc<dyn ProgressReporter>,
}

impl<S: RowSource> Extractor<S> {
    pub fn new(source: S, options: ExtractOptions) -> Self {
        Self {
            source,
            options,
            reporter: Arc::new(NoProgress),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn query(&self) -> String {
        build_query(&self.options.table)
    }

    /// Submit the query and return a cursor positioned before the first record.
    ///
    /// # Errors
    ///
    /// [`EtlError::Extraction`] if the query cannot be submitted.
    pub async fn extract(&self) -> Result<Extraction<'_, S>, EtlError> {
        let sql = self.query();
        log::info!("Submitting query against {}", self.options.table);
        let first = self
            .source
            .open(&sql, self.options.page_size)
            .await
            .map_err(|e| EtlError::extraction("opening query", 0, e))?;
        log::debug!("First page: {} rows", first.rows.len());

        Ok(Extraction {
            source: &self.source,
            buffer: first.rows.into(),
            next: first.next,
            page_size: self.options.page_size,
            progress_every: self.options.progress_every.max(1),
            reporter: self.reporter.as_ref(),
            delivered: 0,
            pages: 1,
            done: false,
        })
    }
}

/// Forward-only cursor over one query's results.
pub struct Extraction<'a, S> {
    source: &'a S,
    buffer: VecDeque<SourceRow>,
    next: Option<PageCursor>,
    page_size: u32,
    progress_every: u64,
    reporter: &'a dyn ProgressReporter,
    delivered: u64,
    pages: u64,
    done: bool,
}

impl<S: RowSource> Extraction<'_, S> {
    /// Records yielded so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Pages fetched so far, including the first.
    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance by one record, fetching the next page when the buffer drains.
    pub async fn next(&mut self) -> Result<Option<Record>, EtlError> {
        loop {
            if self.done {
                return Ok(None);
            }

            if let Some(row) = self.buffer.pop_front() {
                return match row.into_record() {
                    Ok(record) => {
                        self.delivered += 1;
                        if self.delivered % self.progress_every == 0 {
                            self.reporter.report(ProgressEvent::Extracting {
                                n: self.delivered,
                            });
                        }
                        Ok(Some(record))
                    }
                    Err(e) => {
                        self.done = true;
                        Err(EtlError::extraction("decoding row", self.delivered, e))
                    }
                };
            }

            let Some(cursor) = self.next.take() else {
                self.done = true;
                log::info!(
                    "Extraction complete: {} records in {} pages",
                    self.delivered,
                    self.pages
                );
                return Ok(None);
            };

            match self.source.next_page(&cursor, self.page_size).await {
                Ok(page) => {
                    self.pages += 1;
                    log::debug!("Page {}: {} rows", self.pages, page.rows.len());
                    self.buffer.extend(page.rows);
                    self.next = page.next;
                }
                Err(e) => {
                    self.done = true;
                    return Err(EtlError::extraction(
                        "fetching next page",
                        self.delivered,
                        e,
                    ));
                }
            }
        }
    }
}

#[async_trait]
impl<'a, S: RowSource> RecordStream for Extraction<'a, S> {
    async fn next_record(&mut self) -> Result<Option<Record>, EtlError> {
        self.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use std::sync::Mutex;

    fn row(id: i64) -> SourceRow {
        SourceRow {
            id: Some(id),
            title: Some(format!("post {id}")),
            url: None,
            score: Some(id * 2),
            timestamp: None,
            kind: Some("story".into()),
        }
    }

    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn query_filters_empty_titles() {
        let sql = build_query(DEFAULT_SOURCE_TABLE);
        assert!(sql.contains("`bigquery-public-data.hacker_news.full`"));
        assert!(sql.contains(r#"WHERE title != """#));
        assert!(sql.contains(r#"COALESCE(url, "None")"#));
    }

    #[tokio::test]
    async fn walks_all_pages_lazily() {
        let source = InMemorySource::new(vec![vec![row(1), row(2)], vec![], vec![row(3)]]);
        let extractor = Extractor::new(source, ExtractOptions::default());
        let mut extraction = extractor.extract().await.unwrap();
        assert_eq!(extraction.pages(), 1);

        let mut ids = Vec::new();
        while let Some(r) = extraction.next().await.unwrap() {
            ids.push(r.id);
        }
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(extraction.pages(), 3);
        assert_eq!(extraction.delivered(), 3);
        assert!(extraction.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_failure_is_fatal_and_fuses() {
        let source = InMemorySource::new(vec![vec![row(1), row(2)], vec![row(3)]]).fail_on_page(1);
        let extractor = Extractor::new(source, ExtractOptions::default());
        let mut extraction = extractor.extract().await.unwrap();

        assert_eq!(extraction.next().await.unwrap().unwrap().id, 1);
        assert_eq!(extraction.next().await.unwrap().unwrap().id, 2);
        match extraction.next().await {
            Err(EtlError::Extraction { delivered, .. }) => assert_eq!(delivered, 2),
            other => panic!("expected extraction failure, got {:?}", other),
        }
        assert!(extraction.is_done());
        assert!(extraction.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_failure_surfaces_as_extraction_error() {
        let source = InMemorySource::new(vec![vec![row(1)]]).fail_on_page(0);
        let extractor = Extractor::new(source, ExtractOptions::default());
        let err = extractor.extract().await.err().expect("open should fail");
        assert_eq!(err.kind(), "ExtractionFailure");
    }

    #[tokio::test]
    async fn row_without_id_stops_extraction() {
        let bad = SourceRow {
            title: Some("no id".into()),
            ..Default::default()
        };
        let source = InMemorySource::new(vec![vec![row(1), bad, row(3)]]);
        let extractor = Extractor::new(source, ExtractOptions::default());
        let mut extraction = extractor.extract().await.unwrap();
        assert!(extraction.next().await.unwrap().is_some());
        assert!(extraction.next().await.is_err());
        assert!(extraction.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reports_progress_every_batch() {
        let rows: Vec<SourceRow> = (1..=7).map(row).collect();
        let source = InMemorySource::new(vec![rows]);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let extractor = Extractor::new(
            source,
            ExtractOptions {
                progress_every: 3,
                ..Default::default()
            },
        )
        .with_reporter(recorder.clone());

        let extraction = extractor.extract().await.unwrap();
        assert_eq!(crate::stream::count_records(extraction).await.unwrap(), 7);
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                ProgressEvent::Extracting { n: 3 },
                ProgressEvent::Extracting { n: 6 }
            ]
        );
    }

    #[tokio::test]
    async fn a_new_extraction_reopens_the_query() {
        let source = InMemorySource::new(vec![vec![row(1)]]);
        let extractor = Extractor::new(source, ExtractOptions::default());
        for _ in 0..2 {
            let extraction = extractor.extract().await.unwrap();
            assert_eq!(crate::stream::count_records(extraction).await.unwrap(), 1);
        }
        assert_eq!(extractor.source().open_count(), 2);
    }
}
