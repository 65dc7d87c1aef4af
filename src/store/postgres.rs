//! PostgreSQL-backed [`Destination`].
//!
//! The production store. Tables are addressed as `{schema}.{table}`; both
//! names are validated identifiers, so they are interpolated directly.
//! `timestamp` is a `TIMESTAMP` (without time zone) column holding UTC.
//!
//! Tables created elsewhere with `INT`/`SERIAL` id and score columns are
//! accepted as-is: reads widen both to `BIGINT`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::models::Record;

use super::Destination;

/// PostgreSQL implementation of the [`Destination`] trait.
pub struct PostgresDestination {
    pool: PgPool,
    schema: String,
    table: String,
    qualified: String,
}

impl PostgresDestination {
    pub async fn connect(
        url: &str,
        schema: &str,
        table: &str,
        max_connections: u32,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool, schema, table))
    }

    pub fn new(pool: PgPool, schema: &str, table: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
            table: table.to_string(),
            qualified: format!("{}.{}", schema, table),
        }
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    fn table(&self) -> &str {
        &self.table
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1
            ORDER BY table_name
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn create_table(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGINT PRIMARY KEY,
                title TEXT,
                url TEXT,
                type TEXT,
                score BIGINT,
                timestamp TIMESTAMP
            )
            "#,
            self.qualified
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            self.qualified
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert(&self, record: &Record) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (title, url, score, timestamp, id, type) VALUES ($1, $2, $3, $4, $5, $6)",
            self.qualified
        ))
        .bind(&record.title)
        .bind(&record.url)
        .bind(record.score)
        .bind(record.timestamp.map(|ts| ts.naive_utc()))
        .bind(record.id)
        .bind(&record.kind)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Record>> {
        let row = sqlx::query(&format!(
            "SELECT CAST(id AS BIGINT) AS id, title, url, type, \
             CAST(score AS BIGINT) AS score, timestamp \
             FROM {} WHERE id = $1",
            self.qualified
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
            timestamp: row
                .try_get::<Option<NaiveDateTime>, _>("timestamp")?
                .map(|ts| ts.and_utc()),
            kind: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
        }))
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.qualified))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn columns(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS name
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(&self.schema)
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
