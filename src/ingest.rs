//! Pipeline orchestration.
//!
//! Acquires the source and destination handles, runs
//! extract → load sequentially on one task, releases the destination on
//! every exit path, and prints a summary on stdout.

use anyhow::Result;
use std::sync::Arc;

use crate::bigquery::BigQuerySource;
use crate::config::Config;
use crate::db;
use crate::error::EtlError;
use crate::extract::Extractor;
use crate::load::{LoadReport, Loader};
use crate::progress::ProgressReporter;
use crate::source::RowSource;
use crate::store::Destination;
use crate::stream::{count_records, RecordStream};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Extract and count only; never touch the destination.
    pub dry_run: bool,
    /// Stop after this many records.
    pub limit: Option<u64>,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records pulled from the source.
    pub extracted: u64,
    pub load: LoadReport,
}

/// Run one extract → load pass with already-constructed components.
///
/// The schema is bootstrapped before the source query is submitted, so a
/// destination problem fails fast without paying for a scan.
pub async fn run_pipeline<S, D>(
    extractor: &Extractor<S>,
    loader: &mut Loader<D>,
    limit: Option<u64>,
) -> Result<SyncReport, EtlError>
where
    S: RowSource,
    D: Destination,
{
    loader.ensure_schema().await?;

    let mut extraction = extractor.extract().await?;
    let load = match limit {
        Some(max) => loader.load((&mut extraction).limit(max)).await?,
        None => loader.load(&mut extraction).await?,
    };

    Ok(SyncReport {
        extracted: extraction.delivered(),
        load,
    })
}

/// Entry point for `hn-etl sync`.
pub async fn run_sync(
    config: &Config,
    options: &SyncOptions,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<()> {
    let table = &config.destination.table;
    let source = BigQuerySource::from_config(&config.source)?;
    let extractor = Extractor::new(source, config.extract_options()).with_reporter(reporter.clone());

    if options.dry_run {
        let extraction = extractor.extract().await?;
        let found = match options.limit {
            Some(max) => count_records(extraction.limit(max)).await?,
            None => count_records(extraction).await?,
        };
        println!("sync {} (dry-run)", table);
        println!("  records found: {}", found);
        return Ok(());
    }

    let destination = db::connect(&config.destination).await?;
    let mut loader = Loader::new(destination, config.load_options()).with_reporter(reporter);

    let result = run_pipeline(&extractor, &mut loader, options.limit).await;
    loader.destination().close().await;
    let report = result?;

    println!("sync {}", table);
    println!("  fetched: {} records", report.extracted);
    println!("  inserted: {}", report.load.inserted);
    println!("  already present: {}", report.load.skipped);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractOptions;
    use crate::load::LoadOptions;
    use crate::source::{InMemorySource, SourceRow};
    use crate::store::InMemoryDestination;

    fn row(id: i64) -> SourceRow {
        SourceRow {
            id: Some(id),
            title: Some(format!("post {id}")),
            kind: Some("story".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn limit_caps_extraction_and_load() {
        let source = InMemorySource::new(vec![(1..=5).map(row).collect()]);
        let extractor = Extractor::new(source, ExtractOptions::default());
        let mut loader = Loader::new(InMemoryDestination::new(), LoadOptions::default());

        let report = run_pipeline(&extractor, &mut loader, Some(3)).await.unwrap();
        assert_eq!(report.extracted, 3);
        assert_eq!(report.load.inserted, 3);
        assert_eq!(loader.destination().inserted_ids(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn schema_is_ready_before_query_runs() {
        let source = InMemorySource::new(vec![vec![row(1)]]).fail_on_page(0);
        let extractor = Extractor::new(source, ExtractOptions::default());
        let mut loader = Loader::new(InMemoryDestination::new(), LoadOptions::default());

        let err = run_pipeline(&extractor, &mut loader, None).await.unwrap_err();
        assert_eq!(err.kind(), "ExtractionFailure");
        assert_eq!(loader.destination().ops().create_table, 1);
    }
}
