//! Lifecycle steps and their results.

use serde::Serialize;
use std::fmt;

use crate::violation::Violation;

/// The five lifecycle steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    /// POST the resource spec to the collection
    Create,
    /// GET the created record and check round-trip fields
    Read,
    /// PUT the full record with the mutation applied, then re-read
    Update,
    /// DELETE the record
    Delete,
    /// GET the record again and expect 404
    VerifyAbsent,
}

impl Step {
    /// Every step in execution order.
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::VerifyAbsent,
    ];

    /// Upper-case label used in reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::VerifyAbsent => "VERIFY_ABSENT",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Every check held
    Passed,
    /// At least one non-advisory violation
    Failed,
    /// Never attempted because an earlier step made it impossible
    Skipped,
}

/// Result of one lifecycle step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    step: Step,
    outcome: StepOutcome,
    status: Option<u16>,
    message: Option<String>,
    violations: Vec<Violation>,
}

impl StepResult {
    /// Build a result from the violations a step observed.
    ///
    /// The step passes unless a non-advisory violation is present.
    #[must_use]
    pub fn observed(step: Step, status: Option<u16>, violations: Vec<Violation>) -> Self {
        let outcome = if violations.iter().all(Violation::is_advisory) {
            StepOutcome::Passed
        } else {
            StepOutcome::Failed
        };
        Self {
            step,
            outcome,
            status,
            message: None,
            violations,
        }
    }

    /// A passing result with no violations.
    #[must_use]
    pub fn passed(step: Step, status: u16) -> Self {
        Self::observed(step, Some(status), Vec::new())
    }

    /// A failing result carrying a single violation.
    #[must_use]
    pub fn failed(step: Step, status: Option<u16>, violation: Violation) -> Self {
        let mut result = Self::observed(step, status, vec![violation]);
        result.outcome = StepOutcome::Failed;
        result
    }

    /// A step that was never attempted.
    #[must_use]
    pub fn skipped(step: Step, reason: impl Into<String>) -> Self {
        Self {
            step,
            outcome: StepOutcome::Skipped,
            status: None,
            message: Some(reason.into()),
            violations: Vec::new(),
        }
    }

    /// Attach a diagnostic message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Which step this is.
    #[must_use]
    pub const fn step(&self) -> Step {
        self.step
    }

    /// How the step ended.
    #[must_use]
    pub const fn outcome(&self) -> StepOutcome {
        self.outcome
    }

    /// True only for `Passed`.
    #[must_use]
    pub fn success(&self) -> bool {
        self.outcome == StepOutcome::Passed
    }

    /// HTTP status observed by the step's primary request.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Optional diagnostic message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Every violation observed, advisory ones included.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}
