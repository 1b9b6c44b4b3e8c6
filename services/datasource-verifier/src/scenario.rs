//! The DataSource lifecycle scenario.
//!
//! A file-based DataSource with a 15 minute schedule is created, read
//! back, rescheduled to every 30 minutes, then deleted.

use crud_contract::{CrudVerifier, Mutation, ResourceSpec, RunReport, unique_token};
use serde_json::{Value, json};

/// Schedule the record is created with.
pub const INITIAL_CRON: &str = "0 */15 * * * *";

/// Schedule the update switches to.
pub const UPDATED_CRON: &str = "0 */30 * * * *";

/// Fields that must read back exactly as sent.
pub const ROUND_TRIP_FIELDS: [&str; 8] = [
    "name",
    "supplierName",
    "category",
    "filePath",
    "filePattern",
    "cronExpression",
    "isActive",
    "jsonSchema",
];

/// One run's record, round-trip fields and mutation.
#[derive(Debug, Clone)]
pub struct Scenario {
    token: String,
    spec: ResourceSpec,
    round_trip: Vec<String>,
    mutation: Mutation,
}

impl Scenario {
    /// Scenario with a fresh unique token.
    #[must_use]
    pub fn fresh() -> Self {
        Self::with_token(&unique_token())
    }

    /// Scenario whose record name and paths derive from `token`.
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self {
            token: token.to_string(),
            spec: datasource_spec(token),
            round_trip: ROUND_TRIP_FIELDS.iter().map(ToString::to_string).collect(),
            mutation: Mutation::new().set("cronExpression", UPDATED_CRON),
        }
    }

    /// The token making this run's record unique.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The record to create.
    #[must_use]
    pub const fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    /// Fields checked on read and after update.
    #[must_use]
    pub fn round_trip_fields(&self) -> &[String] {
        &self.round_trip
    }

    /// The change applied by the update step.
    #[must_use]
    pub const fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    /// Run the lifecycle with `verifier`.
    pub async fn run(&self, verifier: &CrudVerifier) -> RunReport {
        verifier
            .run(&self.spec, &self.round_trip, &self.mutation)
            .await
    }
}

/// The DataSource record created by a run.
#[must_use]
pub fn datasource_spec(token: &str) -> ResourceSpec {
    ResourceSpec::new()
        .with_field("name", format!("CRUD_TEST_{token}"))
        .with_field("supplierName", "Test Supplier")
        .with_field("connectionString", format!("file:///test/data/{token}"))
        .with_field("category", "Testing")
        .with_field("description", "Automated CRUD test datasource")
        .with_field("isActive", true)
        .with_field("filePath", format!("/test/data/{token}"))
        .with_field("filePattern", "*.json")
        .with_field("cronExpression", INITIAL_CRON)
        .with_field("jsonSchema", transaction_schema())
}

fn transaction_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["transactionId", "amount"],
        "properties": {
            "transactionId": {"type": "string", "pattern": "^TXN-[0-9]{8}$"},
            "amount": {"type": "number", "minimum": 0}
        }
    })
}
