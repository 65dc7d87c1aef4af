//! Record retrieval by id.
//!
//! Used by `hn-etl get` to read one loaded row back from the destination.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::Record;
use crate::store::Destination;

/// Fetch one record by id from the configured destination.
pub async fn get_record(config: &Config, id: i64) -> Result<Record> {
    let destination = db::connect(&config.destination).await?;
    let result = destination.get(id).await;
    destination.close().await;

    match result? {
        Some(record) => Ok(record),
        None => bail!("record not found: {}", id),
    }
}

/// CLI entry point: print the record as pretty JSON.
pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let record = get_record(config, id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
