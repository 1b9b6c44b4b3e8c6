//! DataSource API verification tools.
//!
//! Configuration and entry points for checking that a running DataSource
//! service honours its CRUD contract, and that its collection is empty
//! after a run.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod scenario;

pub use config::{Config, ConfigError};
pub use scenario::Scenario;

use crud_contract::{CollectionSummary, CrudVerifier, RunReport};
use rust_common::PlatformError;
use tracing::{info, warn};

/// Wait for the service if configured, then run one lifecycle.
///
/// A readiness wait that gives up is logged and the run still goes ahead.
///
/// # Errors
///
/// Returns an error only if the HTTP client cannot be built.
pub async fn run_verification(config: &Config) -> Result<RunReport, PlatformError> {
    let verifier = CrudVerifier::new(config.verifier_config())?;

    if let Some(policy) = config.readiness_policy() {
        match verifier.wait_until_ready(&policy).await {
            Ok(attempts) => info!(attempts, "DataSource API is ready"),
            Err(error) => warn!(%error, "DataSource API not ready, running anyway"),
        }
    }

    let scenario = Scenario::fresh();
    info!(token = scenario.token(), target = %config.api_url, "Starting CRUD contract run");
    Ok(scenario.run(&verifier).await)
}

/// Count the records the collection still lists.
///
/// # Errors
///
/// Returns an error if the listing cannot be fetched or parsed.
pub async fn summarize_collection(config: &Config) -> Result<CollectionSummary, PlatformError> {
    CrudVerifier::new(config.verifier_config())?
        .summarize_collection()
        .await
}
