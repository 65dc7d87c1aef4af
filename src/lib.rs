//! # hn-etl
//!
//! Idempotent extract-and-load of Hacker News items from BigQuery into a
//! relational table.
//!
//! The extractor runs one fixed query and exposes the paged result set as a
//! lazy record cursor. The loader creates the destination table on demand
//! and inserts every record whose id is not already present, so re-running
//! the whole pipeline never duplicates a row.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │  BigQuery  │──▶│ Extractor  │──▶│   Loader   │──▶│ Postgres /   │
//! │ (paged)    │   │ (cursor)   │   │ exists→ins │   │ SQLite table │
//! └────────────┘   └────────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hn-etl init                 # create the destination table
//! hn-etl sync --limit 1000    # load the first 1,000 records
//! hn-etl sync                 # load everything (re-runs skip loaded ids)
//! hn-etl get 8863             # read one record back
//! hn-etl stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | The [`Record`](models::Record) type |
//! | [`source`] | Paged source query interface |
//! | [`bigquery`] | BigQuery REST source |
//! | [`extract`] | Lazy record cursor over the source |
//! | [`stream`] | The loader's input contract |
//! | [`store`] | Destination store trait and backends |
//! | [`load`] | Idempotent loader and schema bootstrap |
//! | [`ingest`] | Pipeline orchestration |
//! | [`error`] | Error taxonomy |
//! | [`progress`] | Progress reporting |
//! | [`db`] | Destination connection |

pub mod bigquery;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod load;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod source;
pub mod stats;
pub mod store;
pub mod stream;
