//! Saga error types.

use common::{PayloadError, SagaId};
use run_store::{RunStoreError, SagaStatus};
use thiserror::Error;

use crate::services::ServiceError;

/// Errors raised while building a saga definition or checking a run against it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// A step was registered without a name.
    #[error("Saga '{saga}' has a step with an empty name")]
    EmptyStepName { saga: String },

    /// Two steps share a name.
    #[error("Saga '{saga}' defines step '{step}' more than once")]
    DuplicateStep { saga: String, step: String },

    /// The recorded progress does not line up with the definition's order.
    #[error("Executed steps {executed:?} are not a prefix of saga '{saga}'")]
    ProgressMismatch { saga: String, executed: Vec<String> },
}

/// Errors that can occur during saga operations.
///
/// Step failures are not errors: they end the run through compensation and
/// are reported as a failed [`SagaOutcome`](crate::SagaOutcome).
#[derive(Debug, Error)]
pub enum SagaError {
    /// The run store failed; progress for this call cannot be trusted.
    #[error("Run store error: {0}")]
    Store(#[from] RunStoreError),

    /// No run exists for the identifier.
    #[error("Saga run not found: {0}")]
    RunNotFound(SagaId),

    /// A run already exists for the identifier.
    #[error("Saga run already exists: {0}")]
    AlreadyExists(SagaId),

    /// The run is in a status that does not allow the operation.
    #[error("Cannot {operation} saga {saga_id} in status {status}")]
    InvalidState {
        saga_id: SagaId,
        status: SagaStatus,
        operation: &'static str,
    },

    /// The saga definition is invalid or does not match the run.
    #[error("Invalid saga definition: {0}")]
    Definition(#[from] DefinitionError),

    /// A payload field required by the caller is missing or malformed.
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// An external service call made outside a step failed.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
