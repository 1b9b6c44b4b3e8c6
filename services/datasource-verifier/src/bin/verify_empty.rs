//! Post-run check that the DataSource collection holds no active records.
//!
//! Exits 0 if the listing is empty (soft-deleted records aside), 1 otherwise.

use datasource_verifier::{Config, summarize_collection};
use rust_common::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.tracing_config("verify-empty"));

    info!(target = %config.api_url, "Listing DataSource collection");

    let summary = summarize_collection(&config).await?;
    println!("Collection: {}", config.api_url);
    println!("Records listed: {}", summary.total);
    println!("Active records: {}", summary.active);
    if summary.is_empty() {
        println!("RESULT: collection is empty");
    } else {
        println!("RESULT: {} active record(s) remain", summary.active);
    }

    std::process::exit(i32::from(!summary.is_empty()));
}
