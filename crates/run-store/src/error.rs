use thiserror::Error;

use crate::SagaId;

/// Errors that can occur when reading or writing saga run records.
#[derive(Debug, Error)]
pub enum RunStoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record could not be interpreted.
    #[error("Corrupt run record: {0}")]
    Corrupt(String),

    /// The backend refused or could not complete the operation.
    #[error("Run store unavailable for saga {saga_id}: {reason}")]
    Unavailable { saga_id: SagaId, reason: String },
}

/// Result type for run store operations.
pub type Result<T> = std::result::Result<T, RunStoreError>;
