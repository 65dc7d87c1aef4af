use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::load::Loader;
use crate::store::Destination;

/// Bootstrap the destination table without loading anything.
pub async fn run_init(config: &Config) -> Result<()> {
    let destination = db::connect(&config.destination).await?;
    let mut loader = Loader::new(destination, config.load_options());

    let result = loader.ensure_schema().await;
    loader.destination().close().await;
    result?;
    Ok(())
}
