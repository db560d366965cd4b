use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Result, RunState, SagaId, SagaStatus, store::RunStore};

/// In-memory run store implementation for testing.
///
/// This implementation keeps every record in a map and provides
/// the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    runs: Arc<RwLock<HashMap<SagaId, RunState>>>,
}

impl InMemoryRunStore {
    /// Creates a new empty in-memory run store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of runs stored.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Clears all runs.
    pub async fn clear(&self) {
        self.runs.write().await.clear();
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn get(&self, saga_id: &SagaId) -> Result<Option<RunState>> {
        let runs = self.runs.read().await;
        Ok(runs.get(saga_id).cloned())
    }

    async fn save(&self, saga_id: &SagaId, state: &RunState) -> Result<()> {
        let mut state = state.clone();
        state.touch();
        self.runs.write().await.insert(saga_id.clone(), state);
        Ok(())
    }

    async fn list_by_status(&self, status: SagaStatus) -> Result<Vec<(SagaId, RunState)>> {
        let runs = self.runs.read().await;
        let mut matching: Vec<_> = runs
            .iter()
            .filter(|(_, run)| run.status == status)
            .map(|(id, run)| (id.clone(), run.clone()))
            .collect();
        matching.sort_by(|a, b| a.1.updated_at.cmp(&b.1.updated_at).then(a.0.cmp(&b.0)));
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompensationOutcome, CompensationRecord, Payload, RunStoreExt};

    fn payload_for(order_id: &str) -> Payload {
        [("order_id", serde_json::json!(order_id))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn get_missing_run_returns_none() {
        let store = InMemoryRunStore::new();
        let result = store.get(&SagaId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn save_and_get_round_trips_every_field() {
        let store = InMemoryRunStore::new();
        let saga_id = SagaId::new();

        let mut run = RunState::new(payload_for("ORD-1"));
        run.transition(SagaStatus::Compensating);
        run.record_executed("payment");
        run.record_failure("kitchen", "Kitchen unavailable");
        run.compensations.push(CompensationRecord::new(
            "payment",
            CompensationOutcome::Compensated,
        ));
        store.save(&saga_id, &run).await.unwrap();

        let loaded = store.get(&saga_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SagaStatus::Compensating);
        assert_eq!(loaded.executed_steps, vec!["payment"]);
        assert_eq!(loaded.payload, run.payload);
        assert_eq!(loaded.failure.unwrap().reason, "Kitchen unavailable");
        assert_eq!(loaded.compensations.len(), 1);
    }

    #[tokio::test]
    async fn save_replaces_previous_record() {
        let store = InMemoryRunStore::new();
        let saga_id = SagaId::new();

        let mut run = RunState::new(payload_for("ORD-1"));
        store.save(&saga_id, &run).await.unwrap();

        run.transition(SagaStatus::Executing);
        run.record_executed("payment");
        store.save(&saga_id, &run).await.unwrap();

        assert_eq!(store.run_count().await, 1);
        let loaded = store.get(&saga_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SagaStatus::Executing);
        assert_eq!(loaded.executed_steps, vec!["payment"]);
    }

    #[tokio::test]
    async fn save_refreshes_updated_at() {
        let store = InMemoryRunStore::new();
        let saga_id = SagaId::new();
        let run = RunState::new(Payload::new());

        store.save(&saga_id, &run).await.unwrap();
        let loaded = store.get(&saga_id).await.unwrap().unwrap();
        assert!(loaded.updated_at >= run.updated_at);
        assert_eq!(loaded.created_at, run.created_at);
    }

    #[tokio::test]
    async fn list_by_status_filters_runs() {
        let store = InMemoryRunStore::new();

        let executing = SagaId::from("executing-1");
        let mut run = RunState::new(Payload::new());
        run.transition(SagaStatus::Executing);
        store.save(&executing, &run).await.unwrap();

        let completed = SagaId::from("completed-1");
        let mut run = RunState::new(Payload::new());
        run.transition(SagaStatus::Completed);
        store.save(&completed, &run).await.unwrap();

        let found = store.list_by_status(SagaStatus::Executing).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, executing);

        let none = store
            .list_by_status(SagaStatus::Compensating)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn ext_helpers_report_existence_and_status() {
        let store = InMemoryRunStore::new();
        let saga_id = SagaId::new();
        assert!(!store.exists(&saga_id).await.unwrap());
        assert_eq!(store.status(&saga_id).await.unwrap(), None);

        store
            .save(&saga_id, &RunState::new(Payload::new()))
            .await
            .unwrap();
        assert!(store.exists(&saga_id).await.unwrap());
        assert_eq!(
            store.status(&saga_id).await.unwrap(),
            Some(SagaStatus::PendingStart)
        );
    }

    #[tokio::test]
    async fn clear_removes_all_runs() {
        let store = InMemoryRunStore::new();
        store
            .save(&SagaId::new(), &RunState::new(Payload::new()))
            .await
            .unwrap();
        store.clear().await;
        assert_eq!(store.run_count().await, 0);
    }
}
