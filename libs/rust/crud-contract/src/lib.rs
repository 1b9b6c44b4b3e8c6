//! CRUD contract verification.
//!
//! Drives a create, read, update, delete and verify-absent lifecycle
//! against a JSON resource collection and reports, per step, whether the
//! service honoured the contract.
//!
//! - [`envelope`]: tolerant reading of response envelopes and listings
//! - [`resource`]: the record to create and the mutation to apply
//! - [`verifier`]: the lifecycle driver
//! - [`step`], [`violation`], [`report`]: what a run produces

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod report;
pub mod resource;
pub mod step;
pub mod verifier;
pub mod violation;

pub use envelope::{CollectionSummary, EnvelopeKeys, FieldLookup, lookup_field};
pub use report::RunReport;
pub use resource::{Mutation, NATURAL_KEY_FIELD, ResourceSpec, unique_token};
pub use step::{Step, StepOutcome, StepResult};
pub use verifier::{AcceptedStatuses, CrudVerifier, StepAttempt, TransportFailure, VerifierConfig};
pub use violation::Violation;
