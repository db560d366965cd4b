//! The persisted record of a single saga run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Payload, SagaStatus};

/// The step whose action failed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Name of the failing step.
    pub step: String,
    /// Reason reported by the step (or the caught fault).
    pub reason: String,
    /// When the failure was recorded.
    pub failed_at: DateTime<Utc>,
}

/// Outcome of one compensation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompensationOutcome {
    /// The compensation ran and reported success.
    Compensated,
    /// The step defines no compensation.
    SkippedNoHandler,
    /// The step name is not part of the definition used for rollback.
    SkippedUnknownStep,
    /// The compensation returned an error or panicked.
    Failed { reason: String },
}

impl CompensationOutcome {
    /// Returns true for the `Failed` outcome.
    pub fn is_failure(&self) -> bool {
        matches!(self, CompensationOutcome::Failed { .. })
    }
}

/// Audit entry for a compensation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord {
    /// Name of the step being rolled back.
    pub step: String,
    /// What happened.
    #[serde(flatten)]
    pub outcome: CompensationOutcome,
    /// When the attempt finished.
    pub at: DateTime<Utc>,
}

impl CompensationRecord {
    /// Creates a record stamped with the current time.
    pub fn new(step: impl Into<String>, outcome: CompensationOutcome) -> Self {
        Self {
            step: step.into(),
            outcome,
            at: Utc::now(),
        }
    }
}

/// Everything the orchestrator persists about one run.
///
/// `executed_steps` is append-only and always a prefix of the step names of
/// the definition that produced it. Rollback never removes entries; the list
/// stays as the record of what was attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: SagaStatus,
    pub payload: Payload,
    pub executed_steps: Vec<String>,
    pub failure: Option<StepFailure>,
    pub compensations: Vec<CompensationRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    /// Creates a fresh `pending_start` run holding `payload`.
    pub fn new(payload: Payload) -> Self {
        let now = Utc::now();
        Self {
            status: SagaStatus::PendingStart,
            payload,
            executed_steps: Vec::new(),
            failure: None,
            compensations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if `step` has completed its action in this run.
    pub fn has_executed(&self, step: &str) -> bool {
        self.executed_steps.iter().any(|s| s == step)
    }

    /// Appends `step` to the executed list unless it is already present.
    ///
    /// Returns true if the list changed.
    pub fn record_executed(&mut self, step: &str) -> bool {
        if self.has_executed(step) {
            return false;
        }
        self.executed_steps.push(step.to_string());
        true
    }

    /// Moves the run to `status`.
    pub fn transition(&mut self, status: SagaStatus) {
        self.status = status;
    }

    /// Records the failing step.
    pub fn record_failure(&mut self, step: impl Into<String>, reason: impl Into<String>) {
        self.failure = Some(StepFailure {
            step: step.into(),
            reason: reason.into(),
            failed_at: Utc::now(),
        });
    }

    /// Refreshes `updated_at`; stores call this on every save.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
