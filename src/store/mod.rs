//! Destination store abstraction.
//!
//! The [`Destination`] trait is everything the loader needs from a
//! relational store: list tables, create the destination table, check
//! whether an id is present, and insert one row. Backends:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`PostgresDestination`] | production store |
//! | [`SqliteDestination`] | local runs and tests |
//! | [`InMemoryDestination`] | tests with operation counting and fault injection |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod postgres;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::Record;

pub use memory::{InMemoryDestination, OpCounts};
pub use postgres::PostgresDestination;
pub use sqlite::SqliteDestination;

/// Default destination table name.
pub const DEFAULT_TABLE: &str = "posts";

/// The destination table's columns, in DDL order.
pub const COLUMNS: [&str; 6] = ["id", "title", "url", "type", "score", "timestamp"];

/// Whether `name` is safe to interpolate into SQL as a bare identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A relational store holding one table keyed by record id.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_tables`](Destination::list_tables) | Enumerate existing table names |
/// | [`create_table`](Destination::create_table) | Create the destination table if absent |
/// | [`exists`](Destination::exists) | Is a row with this id present? |
/// | [`insert`](Destination::insert) | Insert one full row |
/// | [`get`](Destination::get) | Read one row back by id |
/// | [`count`](Destination::count) | Number of rows in the table |
/// | [`columns`](Destination::columns) | Column names of the table |
/// | [`close`](Destination::close) | Release the connection pool |
#[async_trait]
pub trait Destination: Send + Sync {
    /// Name of the destination table.
    fn table(&self) -> &str;

    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Create the table with [`COLUMNS`] and `id` as primary key.
    async fn create_table(&self) -> Result<()>;

    async fn exists(&self, id: i64) -> Result<bool>;

    /// Insert `record` as a new row. Fails if the id is already present.
    async fn insert(&self, record: &Record) -> Result<()>;

    async fn get(&self, id: i64) -> Result<Option<Record>>;

    async fn count(&self) -> Result<i64>;

    async fn columns(&self) -> Result<Vec<String>>;

    /// Release pooled connections. Safe to call more than once.
    async fn close(&self);
}

#[async_trait]
impl<D: Destination + ?Sized> Destination for Box<D> {
    fn table(&self) -> &str {
        (**self).table()
    }
    async fn list_tables(&self) -> Result<Vec<String>> {
        (**self).list_tables().await
    }
    async fn create_table(&self) -> Result<()> {
        (**self).create_table().await
    }
    async fn exists(&self, id: i64) -> Result<bool> {
        (**self).exists(id).await
    }
    async fn insert(&self, record: &Record) -> Result<()> {
        (**self).insert(record).await
    }
    async fn get(&self, id: i64) -> Result<Option<Record>> {
        (**self).get(id).await
    }
    async fn count(&self) -> Result<i64> {
        (**self).count().await
    }
    async fn columns(&self) -> Result<Vec<String>> {
        (**self).columns().await
    }
    async fn close(&self) {
        (**self).close().await
    }
}

#[async_trait]
impl<D: Destination + ?Sized> Destination for Arc<D> {
    fn table(&self) -> &str {
        (**self).table()
    }
    async fn list_tables(&self) -> Result<Vec<String>> {
        (**self).list_tables().await
    }
    async fn create_table(&self) -> Result<()> {
        (**self).create_table().await
    }
    async fn exists(&self, id: i64) -> Result<bool> {
        (**self).exists(id).await
    }
    async fn insert(&self, record: &Record) -> Result<()> {
        (**self).insert(record).await
    }
    async fn get(&self, id: i64) -> Result<Option<Record>> {
        (**self).get(id).await
    }
    async fn count(&self) -> Result<i64> {
        (**self).count().await
    }
    async fn columns(&self) -> Result<Vec<String>> {
        (**self).columns().await
    }
    async fn close(&self) {
        (**self).close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        assert!(is_valid_identifier("posts"));
        assert!(is_valid_identifier("_hn_posts2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2posts"));
        assert!(!is_valid_identifier("Posts"));
        assert!(!is_valid_identifier("posts;drop"));
        assert!(!is_valid_identifier("public.posts"));
    }
}
