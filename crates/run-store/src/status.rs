//! Saga run status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RunStoreError;

/// The status of a saga run in its lifecycle.
///
/// State transitions:
/// ```text
/// PendingStart ──► Executing ──┬──► Completed ──┐ (resume re-enters Executing)
///                  ▲           │                │
///                  └───────────┼────────────────┘
///                              └──► Compensating ──► Compensated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    /// Run record created, execution not yet requested.
    #[default]
    PendingStart,

    /// Steps are being executed.
    Executing,

    /// Every step of the last definition succeeded (terminal state).
    Completed,

    /// A step failed and completed steps are being rolled back.
    Compensating,

    /// Rollback finished (terminal state).
    Compensated,
}

impl SagaStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [SagaStatus; 5] = [
        SagaStatus::PendingStart,
        SagaStatus::Executing,
        SagaStatus::Completed,
        SagaStatus::Compensating,
        SagaStatus::Compensated,
    ];

    /// Returns true if forward execution may (re)start from this status.
    pub fn can_execute(&self) -> bool {
        matches!(
            self,
            SagaStatus::PendingStart | SagaStatus::Executing | SagaStatus::Completed
        )
    }

    /// Returns true if compensation may start from this status.
    pub fn can_compensate(&self) -> bool {
        !matches!(self, SagaStatus::Compensated)
    }

    /// Returns true if the last call left the run finished.
    ///
    /// A completed run may still be resumed with a longer definition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Compensated)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::PendingStart => "pending_start",
            SagaStatus::Executing => "executing",
            SagaStatus::Completed => "completed",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Compensated => "compensated",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = RunStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SagaStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| RunStoreError::Corrupt(format!("unknown saga status '{s}'")))
    }
}
