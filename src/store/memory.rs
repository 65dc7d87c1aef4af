//! In-memory [`Destination`] implementation for testing.
//!
//! Rows live in a `BTreeMap` behind `std::sync::RwLock`. Every operation is
//! counted, and the N-th existence check or insert can be made to fail, so
//! tests can observe exactly which statements the loader issued.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::Record;

use super::{Destination, COLUMNS, DEFAULT_TABLE};

/// How many times each operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub list_tables: u64,
    pub create_table: u64,
    pub exists: u64,
    pub insert: u64,
}

/// In-memory store with operation counting and fault injection.
pub struct InMemoryDestination {
    table: String,
    created: RwLock<bool>,
    rows: RwLock<BTreeMap<i64, Record>>,
    insert_log: Mutex<Vec<i64>>,
    ops: Mutex<OpCounts>,
    fail_exists_on: Option<u64>,
    fail_insert_on: Option<u64>,
}

impl InMemoryDestination {
    pub fn new() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            created: RwLock::new(false),
            rows: RwLock::new(BTreeMap::new()),
            insert_log: Mutex::new(Vec::new()),
            ops: Mutex::new(OpCounts::default()),
            fail_exists_on: None,
            fail_insert_on: None,
        }
    }

    /// Start with the table already present.
    pub fn with_table(self) -> Self {
        *self.created.write().unwrap() = true;
        self
    }

    /// Make the `n`-th (1-based) existence check fail.
    pub fn fail_exists_on(mut self, n: u64) -> Self {
        self.fail_exists_on = Some(n);
        self
    }

    /// Make the `n`-th (1-based) insert fail.
    pub fn fail_insert_on(mut self, n: u64) -> Self {
        self.fail_insert_on = Some(n);
        self
    }

    pub fn ops(&self) -> OpCounts {
        *self.ops.lock().unwrap()
    }

    /// Ids in the order their inserts were committed.
    pub fn inserted_ids(&self) -> Vec<i64> {
        self.insert_log.lock().unwrap().clone()
    }

    /// Snapshot of all stored rows, ordered by id.
    pub fn rows(&self) -> Vec<Record> {
        self.rows.read().unwrap().values().cloned().collect()
    }

    fn require_table(&self) -> Result<()> {
        if *self.created.read().unwrap() {
            Ok(())
        } else {
            bail!("relation \"{}\" does not exist", self.table)
        }
    }
}

impl Default for InMemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Destination for InMemoryDestination {
    fn table(&self) -> &str {
        &self.table
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.ops.lock().unwrap().list_tables += 1;
        if *self.created.read().unwrap() {
            Ok(vec![self.table.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn create_table(&self) -> Result<()> {
        self.ops.lock().unwrap().create_table += 1;
        *self.created.write().unwrap() = true;
        Ok(())
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let n = {
            let mut ops = self.ops.lock().unwrap();
            ops.exists += 1;
            ops.exists
        };
        if self.fail_exists_on == Some(n) {
            bail!("injected failure on existence check #{}", n);
        }
        self.require_table()?;
        Ok(self.rows.read().unwrap().contains_key(&id))
    }

    async fn insert(&self, record: &Record) -> Result<()> {
        let n = {
            let mut ops = self.ops.lock().unwrap();
            ops.insert += 1;
            ops.insert
        };
        if self.fail_insert_on == Some(n) {
            bail!("injected failure on insert #{}", n);
        }
        self.require_table()?;
        let mut rows = self.rows.write().unwrap();
        if rows.contains_key(&record.id) {
            return Err(anyhow!(
                "duplicate key value violates unique constraint \"{}_pkey\" (id={})",
                self.table,
                record.id
            ));
        }
        rows.insert(record.id, record.clone());
        self.insert_log.lock().unwrap().push(record.id);
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Record>> {
        self.require_table()?;
        Ok(self.rows.read().unwrap().get(&id).cloned())
    }

    async fn count(&self) -> Result<i64> {
        self.require_table()?;
        Ok(self.rows.read().unwrap().len() as i64)
    }

    async fn columns(&self) -> Result<Vec<String>> {
        self.require_table()?;
        Ok(COLUMNS.iter().map(|c| c.to_string()).collect())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64) -> Record {
        Record {
            id,
            title: "t".into(),
            url: "u".into(),
            score: Some(1),
            timestamp: None,
            kind: "story".into(),
        }
    }

    #[tokio::test]
    async fn insert_requires_table() {
        let dest = InMemoryDestination::new();
        assert!(dest.insert(&record(1)).await.is_err());
        dest.create_table().await.unwrap();
        dest.insert(&record(1)).await.unwrap();
        assert!(dest.exists(1).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let dest = InMemoryDestination::new().with_table();
        dest.insert(&record(7)).await.unwrap();
        let err = dest.insert(&record(7)).await.unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
        assert_eq!(dest.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn injected_failures_count_from_one() {
        let dest = InMemoryDestination::new().with_table().fail_exists_on(2);
        assert!(dest.exists(1).await.is_ok());
        assert!(dest.exists(1).await.is_err());
        assert!(dest.exists(1).await.is_ok());
        assert_eq!(dest.ops().exists, 3);
    }
}
