use async_trait::async_trait;

use crate::{Result, RunState, SagaId, SagaStatus};

/// Core trait for run store implementations.
///
/// A run store holds one record per saga identifier. Implementations must be
/// thread-safe (Send + Sync) and make each `save` durable before returning;
/// the orchestrator relies on that to never lose a completed step.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Loads the record for `saga_id`.
    ///
    /// Returns None if no run has been saved under that identifier.
    async fn get(&self, saga_id: &SagaId) -> Result<Option<RunState>>;

    /// Writes the whole record for `saga_id`, replacing any previous one.
    async fn save(&self, saga_id: &SagaId, state: &RunState) -> Result<()>;

    /// Lists every run currently in `status`.
    ///
    /// Used by recovery sweeps to find runs interrupted by a crash.
    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<(SagaId, RunState)>>;
}

/// Extension trait providing convenience methods for run stores.
#[async_trait]
pub trait RunStoreExt: RunStore {
    /// Checks if a run record exists.
    async fn exists(&self, saga_id: &SagaId) -> Result<bool> {
        Ok(self.get(saga_id).await?.is_some())
    }

    /// Returns the status of a run, if it exists.
    async fn status(&self, saga_id: &SagaId) -> Result<Option<SagaStatus>> {
        Ok(self.get(saga_id).await?.map(|run| run.status))
    }
}

// Blanket implementation for all RunStore implementations
impl<T: RunStore + ?Sized> RunStoreExt for T {}
