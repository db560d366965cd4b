//! Per-saga mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use common::SagaId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one async mutex per saga identifier.
///
/// Every orchestrator operation on a run holds that run's guard for its
/// whole read-modify-write cycle, so a confirmation racing a retry cannot
/// overwrite each other's progress. Entries nobody holds or waits on are
/// pruned on the next acquisition.
#[derive(Debug, Clone, Default)]
pub struct SagaLocks {
    locks: Arc<Mutex<HashMap<SagaId, Arc<Mutex<()>>>>>,
}

impl SagaLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `saga_id`.
    pub async fn acquire(&self, saga_id: &SagaId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(saga_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Returns the number of identifiers currently tracked.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_saga_is_serialized() {
        let locks = SagaLocks::new();
        let saga_id = SagaId::from("saga-1");

        let guard = locks.acquire(&saga_id).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&saga_id)).await;
        assert!(second.is_err());

        drop(guard);
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&saga_id)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn different_sagas_do_not_block() {
        let locks = SagaLocks::new();
        let _a = locks.acquire(&SagaId::from("a")).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&SagaId::from("b"))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = SagaLocks::new();
        drop(locks.acquire(&SagaId::from("a")).await);
        drop(locks.acquire(&SagaId::from("b")).await);

        let _c = locks.acquire(&SagaId::from("c")).await;
        assert_eq!(locks.tracked().await, 1);
    }
}
