//! Idempotent loading into the destination table.
//!
//! The [`Loader`] owns an injected [`Destination`] and guarantees that each
//! record id is inserted at most once across any number of runs:
//!
//! 1. [`ensure_schema`](Loader::ensure_schema) creates the table if it is
//!    missing (`Unknown → Ready`, once per loader).
//! 2. [`load`](Loader::load) drains a [`RecordStream`] in order, and for each
//!    record runs `exists(id)` then inserts only if absent.
//!
//! There is no upsert: a record already present is skipped even if its other
//! fields changed at the source. The first failing check or insert aborts
//! the whole load; rows inserted before it stay committed.
//!
//! Check-then-insert is not atomic. Two loaders writing the same table
//! concurrently can both see an id as absent; the second insert then fails
//! on the primary key and aborts that run.

use serde::Serialize;
use std::sync::Arc;

use crate::error::{EtlError, LoadOp};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::store::Destination;
use crate::stream::RecordStream;

/// Schema bootstrap state of a [`Loader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// Table existence not yet confirmed.
    Unknown,
    /// Table confirmed or created; no further DDL for this loader.
    Ready,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Emit a progress event every this many records.
    pub progress_every: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            progress_every: 100_000,
        }
    }
}

/// Counts for one completed load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Records examined.
    pub processed: u64,
    /// Records written as new rows.
    pub inserted: u64,
    /// Records whose id was already present.
    pub skipped: u64,
}

pub struct Loader<D> {
    destination: D,
    state: SchemaState,
    progress_every: u64,
    reporter: Arc<dyn ProgressReporter>,
}

impl<D: Destination> Loader<D> {
    pub fn new(destination: D, options: LoadOptions) -> Self {
        Self {
            destination,
            state: SchemaState::Unknown,
            progress_every: options.progress_every.max(1),
            reporter: Arc::new(NoProgress),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn state(&self) -> SchemaState {
        self.state
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Make sure the destination table exists.
    ///
    /// Lists existing tables and creates the destination table only if it
    /// is absent. Once `Ready`, further calls do no I/O at all.
    ///
    /// # Errors
    ///
    /// [`EtlError::Schema`] if listing or creation fails; the state stays
    /// `Unknown`.
    pub async fn ensure_schema(&mut self) -> Result<(), EtlError> {
        if self.state == SchemaState::Ready {
            return Ok(());
        }

        let table = self.destination.table().to_string();
        let tables = self
            .destination
            .list_tables()
            .await
            .map_err(|e| EtlError::schema(&table, e))?;

        if tables.iter().any(|t| t == &table) {
            log::info!("Table {} already created", table);
        } else {
            self.destination
                .create_table()
                .await
                .map_err(|e| EtlError::schema(&table, e))?;
            log::info!("Table {} successfully created", table);
        }

        self.state = SchemaState::Ready;
        Ok(())
    }

    /// Drain `records`, inserting every record whose id is not yet present.
    ///
    /// # Errors
    ///
    /// - [`EtlError::Schema`] from [`ensure_schema`](Loader::ensure_schema).
    /// - [`EtlError::Load`] on the first failing existence check or insert;
    ///   no later record is attempted.
    /// - Any error from the stream itself, passed through unchanged.
    pub async fn load<R: RecordStream>(&mut self, mut records: R) -> Result<LoadReport, EtlError> {
        self.ensure_schema().await?;

        let mut report = LoadReport::default();
        while let Some(record) = records.next_record().await? {
            let present = self
                .destination
                .exists(record.id)
                .await
                .map_err(|e| load_error(LoadOp::Exists, record.id, &report, e))?;

            if present {
                report.skipped += 1;
            } else {
                self.destination
                    .insert(&record)
                    .await
                    .map_err(|e| load_error(LoadOp::Insert, record.id, &report, e))?;
                report.inserted += 1;
            }

            report.processed += 1;
            if report.processed % self.progress_every == 0 {
                self.reporter.report(ProgressEvent::Loading {
                    n: report.processed,
                    inserted: report.inserted,
                });
            }
        }

        log::info!(
            "Load complete: {} processed, {} inserted, {} already present",
            report.processed,
            report.inserted,
            report.skipped
        );
        Ok(report)
    }
}

fn load_error(op: LoadOp, id: i64, report: &LoadReport, cause: anyhow::Error) -> EtlError {
    EtlError::Load {
        op,
        id,
        processed: report.processed,
        inserted: report.inserted,
        source: cause.into(),
    }
}
