//! Destination table overview for `hn-etl stats`.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::progress::format_number;
use crate::store::Destination;

struct TableStats {
    exists: bool,
    rows: i64,
    columns: Vec<String>,
}

async fn collect(destination: &dyn Destination) -> Result<TableStats> {
    let tables = destination.list_tables().await?;
    if !tables.iter().any(|t| t == destination.table()) {
        return Ok(TableStats {
            exists: false,
            rows: 0,
            columns: Vec::new(),
        });
    }
    Ok(TableStats {
        exists: true,
        rows: destination.count().await?,
        columns: destination.columns().await?,
    })
}

/// Run the stats command: query the destination and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let destination = db::connect(&config.destination).await?;
    let result = collect(&*destination).await;
    destination.close().await;
    let stats = result?;

    println!("hn-etl Destination Stats");
    println!("========================");
    println!();
    println!("  Destination: {}", db::redact(&config.destination.url));
    println!("  Table:       {}", config.destination.table);
    if stats.exists {
        println!("  Rows:        {}", format_number(stats.rows.max(0) as u64));
        println!("  Columns:     {}", stats.columns.join(", "));
    } else {
        println!("  Rows:        table not created yet (run `hn-etl init`)");
    }
    println!();
    Ok(())
}
