//! Contract violations observed during a run.
//!
//! Violations are data, not control flow: every one a step observes is
//! collected into its `StepResult` and the run keeps going until a fatal
//! one is recorded.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::step::Step;

/// A discrepancy between the service's behaviour and the CRUD contract.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Connection refused, timeout, or other transport failure
    #[error("{step}: transport failure: {reason}")]
    Transport {
        /// Step whose request failed
        step: Step,
        /// Transport error text
        reason: String,
    },

    /// Status outside the set the step accepts
    #[error("{step}: unexpected status {actual} (expected one of {expected:?}){}", excerpt_suffix(.body_excerpt))]
    UnexpectedStatus {
        /// Step that observed the status
        step: Step,
        /// Accepted statuses
        expected: Vec<u16>,
        /// Observed status
        actual: u16,
        /// Leading part of the response body
        body_excerpt: String,
    },

    /// Accepted status on create but no identifier anywhere in the body
    #[error("CREATE: status {status} accepted but no identifier returned (probed {probed:?})")]
    NoIdentifierReturned {
        /// Observed status
        status: u16,
        /// Identifier keys that were probed
        probed: Vec<String>,
    },

    /// A round-trip field is missing or differs from what was written
    #[error("{step}: field `{field}` mismatch: expected {}, got {}", show(.expected.as_ref()), show(.actual.as_ref()))]
    FieldMismatch {
        /// Step that read the record
        step: Step,
        /// Field name as declared
        field: String,
        /// Declared value, `None` when only presence is required
        expected: Option<Value>,
        /// Value read back, `None` when missing
        actual: Option<Value>,
    },

    /// Field found only under a different capitalisation
    #[error("{step}: field `{field}` only found as `{actual_key}` (case-insensitive match)")]
    FieldCaseMismatch {
        /// Step that read the record
        step: Step,
        /// Field name as declared
        field: String,
        /// Spelling the service used
        actual_key: String,
    },

    /// The record read back carries a different identifier
    #[error("{step}: identifier changed from `{expected}` to `{actual}`")]
    IdentifierChanged {
        /// Step that read the record
        step: Step,
        /// Identifier returned by create
        expected: String,
        /// Identifier in the read payload
        actual: String,
    },

    /// Update accepted but the new value did not persist
    #[error("UPDATE: accepted but not applied: `{field}` expected {}, got {}", show(Some(.expected)), show(.actual.as_ref()))]
    UpdateNotApplied {
        /// Mutated field
        field: String,
        /// New value sent
        expected: Value,
        /// Value read back afterwards
        actual: Option<Value>,
    },

    /// Record still readable after delete
    #[error("VERIFY_ABSENT: record still present after delete (status {status})")]
    RecordStillPresent {
        /// Observed status
        status: u16,
    },

    /// Body could not be read as the JSON shape the step needs
    #[error("{step}: unusable response body: {reason}")]
    InvalidBody {
        /// Step that received the body
        step: Step,
        /// What was wrong
        reason: String,
    },

    /// Cleanup could not be confirmed; the record may still exist
    #[error("record {} may remain at {location}", residue_subject(.identifier.as_deref(), .natural_key.as_deref()))]
    ResidualRecord {
        /// Identifier of the created record, `None` if create returned none
        identifier: Option<String>,
        /// Natural key the record was created with, such as its unique name
        natural_key: Option<String>,
        /// URL of the record, or of the collection if the identifier is unknown
        location: String,
    },
}

impl Violation {
    /// Fatal violations end the run; nothing after them can be attempted.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::NoIdentifierReturned { .. })
    }

    /// Advisory violations are reported but do not fail a step.
    #[must_use]
    pub const fn is_advisory(&self) -> bool {
        matches!(self, Self::FieldCaseMismatch { .. } | Self::ResidualRecord { .. })
    }

    /// True for infrastructure-level failures ("service is down").
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

const EXCERPT_LIMIT: usize = 200;

/// Truncate a body for inclusion in a report.
#[must_use]
pub fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(EXCERPT_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

fn excerpt_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

fn residue_subject(identifier: Option<&str>, natural_key: Option<&str>) -> String {
    match (identifier, natural_key) {
        (Some(id), Some(key)) => format!("`{id}` ({key})"),
        (Some(id), None) => format!("`{id}`"),
        (None, Some(key)) => format!("named `{key}` (identifier unknown)"),
        (None, None) => "with unknown identifier".to_string(),
    }
}

fn show(value: Option<&Value>) -> String {
    value.map_or_else(|| "<missing>".to_string(), Value::to_string)
}
