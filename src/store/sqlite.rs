//! SQLite-backed [`Destination`].
//!
//! Used for local runs (`url = "sqlite:./data/hn.sqlite"`) and the test
//! suite. The database file and its parent directories are created if they
//! don't exist, and WAL journal mode is enabled.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::models::Record;

use super::Destination;

/// SQLite implementation of the [`Destination`] trait.
pub struct SqliteDestination {
    pool: SqlitePool,
    table: String,
}

impl SqliteDestination {
    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &str, table: &str, max_connections: u32) -> Result<Self> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self::new(pool, table))
    }

    pub fn new(pool: SqlitePool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl Destination for SqliteDestination {
    fn table(&self) -> &str {
        &self.table
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn create_table(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                title TEXT,
                url TEXT,
                type TEXT,
                score INTEGER,
                timestamp TIMESTAMP
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)",
            self.table
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert(&self, record: &Record) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (title, url, score, timestamp, id, type) VALUES (?, ?, ?, ?, ?, ?)",
            self.table
        ))
        .bind(&record.title)
        .bind(&record.url)
        .bind(record.score)
        .bind(record.timestamp)
        .bind(record.id)
        .bind(&record.kind)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Record>> {
        let row = sqlx::query(&format!(
            "SELECT id, title, url, type, score, timestamp FROM {} WHERE id = ?",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Record {
            id: row.try_get("id")?,
            title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
            url: row.try_get::<Option<String>, _>("url")?.unwrap_or_default(),
            score: row.try_get("score")?,
            timestamp: row.try_get::<Option<DateTime<Utc>>, _>("timestamp")?,
            kind: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
        }))
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn columns(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", self.table))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
