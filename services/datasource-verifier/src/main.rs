//! DataSource CRUD verifier - main entry point
//!
//! Runs create, read, update, delete and verify-absent once against the
//! configured DataSource API, prints the report and exits 0 only if every
//! step passed.

use datasource_verifier::{Config, run_verification};
use rust_common::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.tracing_config("datasource-verifier"));

    info!(target = %config.api_url, "Starting DataSource CRUD verifier");

    let report = run_verification(&config).await?;
    println!("{report}");

    std::process::exit(report.exit_code());
}
