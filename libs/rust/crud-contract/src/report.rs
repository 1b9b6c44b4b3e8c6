//! Run reports.

use serde::Serialize;
use std::fmt;

use crate::step::{Step, StepOutcome, StepResult};
use crate::violation::Violation;

const RULE_WIDTH: usize = 80;

/// Outcome of one lifecycle run. Always holds one result per step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    target: String,
    steps: Vec<StepResult>,
    residue: Option<Violation>,
}

impl RunReport {
    /// Assemble a report from the step results of a finished run.
    ///
    /// Steps missing from `steps` are recorded as skipped so the report
    /// always covers the whole lifecycle in order.
    #[must_use]
    pub fn new(target: impl Into<String>, steps: Vec<StepResult>, residue: Option<Violation>) -> Self {
        let mut by_step = steps.into_iter();
        let mut ordered = Vec::with_capacity(Step::ALL.len());
        let mut pending = by_step.next();
        for step in Step::ALL {
            match pending.take() {
                Some(result) if result.step() == step => {
                    ordered.push(result);
                    pending = by_step.next();
                }
                other => {
                    pending = other;
                    ordered.push(StepResult::skipped(step, "not attempted"));
                }
            }
        }
        Self {
            target: target.into(),
            steps: ordered,
            residue,
        }
    }

    /// The collection URL the run targeted.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Step results in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Result for one step.
    #[must_use]
    pub fn step(&self, step: Step) -> Option<&StepResult> {
        self.steps.iter().find(|r| r.step() == step)
    }

    /// Number of steps that passed.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.steps.iter().filter(|r| r.success()).count()
    }

    /// Number of steps in the lifecycle.
    #[must_use]
    pub fn total(&self) -> usize {
        self.steps.len()
    }

    /// True iff every step passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.passed() == self.total()
    }

    /// The transport failure that aborted the run, if any.
    #[must_use]
    pub fn infrastructure_failure(&self) -> Option<&Violation> {
        self.steps
            .iter()
            .flat_map(StepResult::violations)
            .find(|v| v.is_infrastructure())
    }

    /// Advisory about a record the run may have left behind.
    #[must_use]
    pub const fn residue(&self) -> Option<&Violation> {
        self.residue.as_ref()
    }

    /// Every discrepancy found, in step order, residue last.
    pub fn discrepancies(&self) -> impl Iterator<Item = &Violation> {
        self.steps
            .iter()
            .flat_map(StepResult::violations)
            .chain(self.residue.iter())
    }

    /// Process exit code for a CLI entry point.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);

        writeln!(f, "{heavy}")?;
        writeln!(f, "CRUD CONTRACT RUN: {}", self.target)?;
        writeln!(f, "{heavy}")?;
        for result in &self.steps {
            let mark = match result.outcome() {
                StepOutcome::Passed => "✓ PASS",
                StepOutcome::Failed => "✗ FAIL",
                StepOutcome::Skipped => "- SKIP",
            };
            let status = result
                .status()
                .map_or_else(|| "   ".to_string(), |s| s.to_string());
            write!(f, "  {:<14} {mark}  {status}", result.step().as_str())?;
            if let Some(message) = result.message() {
                write!(f, "  {message}")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "{light}")?;
        writeln!(f, "Steps passed: {}/{}", self.passed(), self.total())?;

        let (advisories, issues): (Vec<_>, Vec<_>) =
            self.discrepancies().partition(|v| v.is_advisory());
        if !issues.is_empty() {
            writeln!(f)?;
            writeln!(f, "ISSUES FOUND:")?;
            for (n, issue) in issues.iter().enumerate() {
                writeln!(f, "  {}. {issue}", n + 1)?;
            }
        }
        if !advisories.is_empty() {
            writeln!(f)?;
            writeln!(f, "ADVISORIES:")?;
            for advisory in advisories {
                writeln!(f, "  ! {advisory}")?;
            }
        }

        writeln!(f, "{heavy}")?;
        if self.is_success() {
            writeln!(f, "RESULT: all {} steps verified", self.total())?;
        } else if self.infrastructure_failure().is_some() {
            writeln!(f, "RESULT: service unreachable or not responding, run aborted")?;
        } else {
            writeln!(
                f,
                "RESULT: {} of {} steps failed",
                self.total() - self.passed(),
                self.total()
            )?;
        }
        write!(f, "{heavy}")
    }
}
