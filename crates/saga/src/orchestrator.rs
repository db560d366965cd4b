//! Saga orchestrator: forward execution with idempotent replay, and
//! reverse-order compensation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use common::{Payload, SagaId};
use futures_util::FutureExt;
use run_store::{CompensationOutcome, CompensationRecord, RunState, RunStore, SagaStatus};

use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};
use crate::locks::SagaLocks;
use crate::step::{Step, StepCompensation, StepError};

/// Result of a call to [`Orchestrator::execute`].
///
/// Step-level detail (which step failed, how each compensation went) lives in
/// the persisted [`RunState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
    /// Every step of the definition has completed.
    Completed,
    /// A step failed and the run was compensated.
    Failed { error: String },
}

impl SagaOutcome {
    /// Returns true if the run completed.
    pub fn is_success(&self) -> bool {
        matches!(self, SagaOutcome::Completed)
    }

    /// Returns the failure reason, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            SagaOutcome::Completed => None,
            SagaOutcome::Failed { error } => Some(error.as_str()),
        }
    }
}

/// What a recovery sweep did with one interrupted run.
#[derive(Debug)]
pub enum RecoveryAction {
    /// The run was left executing and has been re-driven.
    Resumed(SagaOutcome),
    /// The run was left compensating and rollback has been finished.
    Compensated(Vec<CompensationRecord>),
}

/// One entry of a recovery sweep report.
#[derive(Debug)]
pub struct RecoveredRun {
    pub saga_id: SagaId,
    pub result: Result<RecoveryAction>,
}

/// Stateless execution engine for saga runs.
///
/// The orchestrator owns no step list; each call receives the
/// [`SagaDefinition`] to drive. Progress is persisted to the run store after
/// every successful step, and every operation on a run holds that run's lock
/// for its full duration.
pub struct Orchestrator<S>
where
    S: RunStore,
{
    store: S,
    locks: SagaLocks,
}

impl<S> Clone for Orchestrator<S>
where
    S: RunStore + Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<S> Orchestrator<S>
where
    S: RunStore,
{
    /// Creates a new orchestrator over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: SagaLocks::new(),
        }
    }

    /// Returns the underlying run store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a `pending_start` run for `saga_id`.
    #[tracing::instrument(skip(self, payload))]
    pub async fn create_run(&self, saga_id: &SagaId, payload: Payload) -> Result<RunState> {
        let _guard = self.locks.acquire(saga_id).await;

        if self.load(saga_id).await?.is_some() {
            return Err(SagaError::AlreadyExists(saga_id.clone()));
        }

        let run = RunState::new(payload);
        self.persist(saga_id, &run).await?;
        tracing::info!(%saga_id, "saga run created");
        Ok(run)
    }

    /// Loads the persisted record of a run.
    pub async fn get_run(&self, saga_id: &SagaId) -> Result<Option<RunState>> {
        self.load(saga_id).await
    }

    /// Drives `definition` forward for `saga_id`.
    ///
    /// Steps already recorded as executed are skipped, so calling this again
    /// resumes right after the recorded prefix. `payload` seeds the run only
    /// when no payload has been persisted yet; otherwise the persisted one
    /// wins. A failing step triggers compensation of everything executed so
    /// far and is reported as [`SagaOutcome::Failed`]. Run store failures are
    /// returned as errors without compensating.
    #[tracing::instrument(skip(self, definition, payload), fields(saga = %definition.name()))]
    pub async fn execute(
        &self,
        saga_id: &SagaId,
        definition: &SagaDefinition,
        payload: Payload,
    ) -> Result<SagaOutcome> {
        let _guard = self.locks.acquire(saga_id).await;
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        let mut run = match self.load(saga_id).await? {
            Some(run) => run,
            None => RunState::new(Payload::new()),
        };

        if !run.status.can_execute() {
            return Err(SagaError::InvalidState {
                saga_id: saga_id.clone(),
                status: run.status,
                operation: "execute",
            });
        }
        definition.check_progress(&run.executed_steps)?;

        if run.payload.is_empty() {
            run.payload = payload;
        }
        run.transition(SagaStatus::Executing);
        self.persist(saga_id, &run).await?;

        for step in definition.steps() {
            if run.has_executed(step.name()) {
                tracing::info!(step = step.name(), "saga step already executed, skipping");
                continue;
            }

            tracing::info!(step = step.name(), "saga step started");
            match run_action(step, &mut run.payload).await {
                Ok(()) => {
                    run.record_executed(step.name());
                    self.persist(saga_id, &run).await?;
                    tracing::info!(step = step.name(), "saga step completed");
                }
                Err(err) => {
                    tracing::warn!(step = step.name(), error = %err, "saga step failed, compensating");
                    metrics::counter!("saga_step_failures_total", "step" => step.name().to_string())
                        .increment(1);

                    run.record_failure(step.name(), err.reason());
                    self.persist(saga_id, &run).await?;
                    self.rollback(saga_id, &mut run, definition).await?;

                    metrics::histogram!("saga_duration_seconds")
                        .record(saga_start.elapsed().as_secs_f64());
                    return Ok(SagaOutcome::Failed {
                        error: err.reason().to_string(),
                    });
                }
            }
        }

        run.transition(SagaStatus::Completed);
        self.persist(saga_id, &run).await?;

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        metrics::counter!("saga_completed").increment(1);
        tracing::info!(%saga_id, duration, "saga completed successfully");

        Ok(SagaOutcome::Completed)
    }

    /// Rolls back every executed step of `saga_id` in reverse order.
    ///
    /// Compensation is best effort: steps without a compensation, steps the
    /// definition no longer contains, and compensations that fail are
    /// recorded and skipped. The run always ends `compensated` unless the
    /// store fails. Compensating an already compensated run returns its
    /// existing records.
    #[tracing::instrument(skip(self, definition, payload), fields(saga = %definition.name()))]
    pub async fn compensate(
        &self,
        saga_id: &SagaId,
        definition: &SagaDefinition,
        payload: Payload,
    ) -> Result<Vec<CompensationRecord>> {
        let _guard = self.locks.acquire(saga_id).await;

        let mut run = self
            .load(saga_id)
            .await?
            .ok_or_else(|| SagaError::RunNotFound(saga_id.clone()))?;

        if !run.status.can_compensate() {
            tracing::info!(%saga_id, "saga already compensated");
            return Ok(run.compensations);
        }
        if run.payload.is_empty() {
            run.payload = payload;
        }

        self.rollback(saga_id, &mut run, definition).await?;
        Ok(run.compensations)
    }

    /// Records `step` as executed without running its action.
    ///
    /// Used when a step's effect was confirmed out of band, e.g. a payment
    /// approved by staff. Recording an already executed step is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn record_step_completed(&self, saga_id: &SagaId, step: &str) -> Result<RunState> {
        let _guard = self.locks.acquire(saga_id).await;

        let mut run = self
            .load(saga_id)
            .await?
            .ok_or_else(|| SagaError::RunNotFound(saga_id.clone()))?;

        if !run.status.can_execute() {
            return Err(SagaError::InvalidState {
                saga_id: saga_id.clone(),
                status: run.status,
                operation: "record a step for",
            });
        }

        if run.record_executed(step) {
            self.persist(saga_id, &run).await?;
            tracing::info!(%saga_id, step, "step recorded as executed");
        }
        Ok(run)
    }

    /// Finishes runs interrupted by a crash.
    ///
    /// Runs left `executing` are re-driven with `definition`; runs left
    /// `compensating` have their rollback completed. A failure on one run is
    /// reported in its entry and does not stop the sweep.
    ///
    /// Every executing run is driven with the same `definition`, so this fits
    /// workflows with a single stage. Staged workflows such as
    /// [`OrderWorkflow`](crate::OrderWorkflow) run their own sweep.
    #[tracing::instrument(skip(self, definition), fields(saga = %definition.name()))]
    pub async fn recover(&self, definition: &SagaDefinition) -> Result<Vec<RecoveredRun>> {
        let mut report = Vec::new();

        for (saga_id, _) in self.store.list_by_status(SagaStatus::Executing).await? {
            let result = self
                .execute(&saga_id, definition, Payload::new())
                .await
                .map(RecoveryAction::Resumed);
            report.push(RecoveredRun { saga_id, result });
        }

        for (saga_id, _) in self.store.list_by_status(SagaStatus::Compensating).await? {
            let result = self
                .compensate(&saga_id, definition, Payload::new())
                .await
                .map(RecoveryAction::Compensated);
            report.push(RecoveredRun { saga_id, result });
        }

        tracing::info!(runs = report.len(), "recovery sweep finished");
        Ok(report)
    }

    /// Compensates `run` while the caller holds its lock.
    async fn rollback(
        &self,
        saga_id: &SagaId,
        run: &mut RunState,
        definition: &SagaDefinition,
    ) -> Result<()> {
        run.transition(SagaStatus::Compensating);
        self.persist(saga_id, run).await?;

        let executed = run.executed_steps.clone();
        for name in executed.iter().rev() {
            // Attempts recorded before an interruption are not repeated.
            if run.compensations.iter().any(|r| &r.step == name) {
                continue;
            }

            let outcome = match definition.step(name) {
                None => {
                    tracing::info!(step = %name, "step not in definition, nothing to compensate");
                    CompensationOutcome::SkippedUnknownStep
                }
                Some(step) => match step.compensation() {
                    None => {
                        tracing::info!(step = %name, "no compensation defined for step");
                        CompensationOutcome::SkippedNoHandler
                    }
                    Some(compensation) => {
                        tracing::info!(step = %name, "compensating step");
                        match run_compensation(compensation, &run.payload).await {
                            Ok(()) => CompensationOutcome::Compensated,
                            Err(err) => {
                                tracing::warn!(step = %name, error = %err, "compensation failed, continuing");
                                metrics::counter!(
                                    "saga_compensation_failures_total",
                                    "step" => name.clone()
                                )
                                .increment(1);
                                CompensationOutcome::Failed {
                                    reason: err.reason().to_string(),
                                }
                            }
                        }
                    }
                },
            };

            run.compensations
                .push(CompensationRecord::new(name.as_str(), outcome));
            self.persist(saga_id, run).await?;
        }

        run.transition(SagaStatus::Compensated);
        self.persist(saga_id, run).await?;

        metrics::counter!("saga_compensated").increment(1);
        tracing::warn!(%saga_id, "saga compensated");
        Ok(())
    }

    async fn load(&self, saga_id: &SagaId) -> Result<Option<RunState>> {
        self.store.get(saga_id).await.map_err(|e| {
            metrics::counter!("saga_persistence_errors_total").increment(1);
            tracing::error!(%saga_id, error = %e, "failed to load saga run");
            SagaError::Store(e)
        })
    }

    async fn persist(&self, saga_id: &SagaId, run: &RunState) -> Result<()> {
        self.store.save(saga_id, run).await.map_err(|e| {
            metrics::counter!("saga_persistence_errors_total").increment(1);
            tracing::error!(%saga_id, status = %run.status, error = %e, "failed to persist saga run");
            SagaError::Store(e)
        })
    }
}

/// Runs a step's action, turning panics and timeouts into step failures.
async fn run_action(step: &Step, payload: &mut Payload) -> std::result::Result<(), StepError> {
    let action = AssertUnwindSafe(step.action().execute(payload)).catch_unwind();

    let result = match step.timeout() {
        Some(limit) => match tokio::time::timeout(limit, action).await {
            Ok(result) => result,
            Err(_) => {
                return Err(StepError::new(format!(
                    "step '{}' timed out after {}ms",
                    step.name(),
                    limit.as_millis()
                )));
            }
        },
        None => action.await,
    };

    result.unwrap_or_else(|panic| Err(StepError::new(panic_message(panic.as_ref()))))
}

/// Runs a compensation, turning panics into failures.
async fn run_compensation(
    compensation: &dyn StepCompensation,
    payload: &Payload,
) -> std::result::Result<(), StepError> {
    AssertUnwindSafe(compensation.compensate(payload))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(StepError::new(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("step panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("step panicked: {msg}")
    } else {
        "step panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use run_store::InMemoryRunStore;

    use super::*;
    use crate::step::StepAction;

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    enum Behavior {
        Succeed,
        Fail(&'static str),
        Panic,
    }

    struct Recorded {
        name: &'static str,
        behavior: Behavior,
        journal: Journal,
    }

    #[async_trait]
    impl StepAction for Recorded {
        async fn execute(&self, payload: &mut Payload) -> std::result::Result<(), StepError> {
            self.journal.push(format!("do:{}", self.name));
            match self.behavior {
                Behavior::Succeed => {
                    payload.insert(format!("{}_id", self.name), format!("{}-1", self.name));
                    Ok(())
                }
                Behavior::Fail(reason) => Err(StepError::new(reason)),
                Behavior::Panic => panic!("{} exploded", self.name),
            }
        }
    }

    #[async_trait]
    impl StepCompensation for Recorded {
        async fn compensate(&self, _payload: &Payload) -> std::result::Result<(), StepError> {
            self.journal.push(format!("undo:{}", self.name));
            Ok(())
        }
    }

    fn step(name: &'static str, behavior: Behavior, journal: &Journal) -> Step {
        Step::compensable(
            name,
            Recorded {
                name,
                behavior,
                journal: journal.clone(),
            },
        )
    }

    fn orchestrator() -> Orchestrator<InMemoryRunStore> {
        Orchestrator::new(InMemoryRunStore::new())
    }

    #[tokio::test]
    async fn test_happy_path() {
        let journal = Journal::default();
        let def = SagaDefinition::builder("order")
            .step(step("payment", Behavior::Succeed, &journal))
            .step(step("kitchen", Behavior::Succeed, &journal))
            .build()
            .unwrap();
        let orch = orchestrator();
        let saga_id = SagaId::new();

        let outcome = orch.execute(&saga_id, &def, Payload::new()).await.unwrap();
        assert_eq!(outcome, SagaOutcome::Completed);

        let run = orch.get_run(&saga_id).await.unwrap().unwrap();
        assert_eq!(run.status, SagaStatus::Completed);
        assert_eq!(run.executed_steps, vec!["payment", "kitchen"]);
        assert_eq!(run.payload.get_str("payment_id"), Some("payment-1"));
        assert_eq!(journal.entries(), vec!["do:payment", "do:kitchen"]);
    }

    #[tokio::test]
    async fn test_failure_compensates_in_reverse() {
        let journal = Journal::default();
        let def = SagaDefinition::builder("order")
            .step(step("payment", Behavior::Succeed, &journal))
            .step(step("kitchen", Behavior::Succeed, &journal))
            .step(step("delivery", Behavior::Fail("No drivers"), &journal))
            .build()
            .unwrap();
        let orch = orchestrator();
        let saga_id = SagaId::new();

        let outcome = orch.execute(&saga_id, &def, Payload::new()).await.unwrap();
        assert_eq!(outcome.error(), Some("No drivers"));

        assert_eq!(
            journal.entries(),
            vec![
                "do:payment",
                "do:kitchen",
                "do:delivery",
                "undo:kitchen",
                "undo:payment"
            ]
        );

        let run = orch.get_run(&saga_id).await.unwrap().unwrap();
        assert_eq!(run.status, SagaStatus::Compensated);
        assert_eq!(run.executed_steps, vec!["payment", "kitchen"]);
        let failure = run.failure.unwrap();
        assert_eq!(failure.step, "delivery");
        assert_eq!(failure.reason, "No drivers");
    }

    #[tokio::test]
    async fn test_panic_is_treated_as_failure() {
        let journal = Journal::default();
        let def = SagaDefinition::builder("order")
            .step(step("payment", Behavior::Succeed, &journal))
            .step(step("kitchen", Behavior::Panic, &journal))
            .build()
            .unwrap();
        let orch = orchestrator();
        let saga_id = SagaId::new();

        let outcome = orch.execute(&saga_id, &def, Payload::new()).await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.error().unwrap().contains("kitchen exploded"));
        assert!(journal.entries().contains(&"undo:payment".to_string()));
    }

    #[tokio::test]
    async fn test_execute_rejects_compensated_run() {
        let journal = Journal::default();
        let def = SagaDefinition::builder("order")
            .step(step("payment", Behavior::Fail("declined"), &journal))
            .build()
            .unwrap();
        let orch = orchestrator();
        let saga_id = SagaId::new();

        orch.execute(&saga_id, &def, Payload::new()).await.unwrap();
        let result = orch.execute(&saga_id, &def, Payload::new()).await;
        assert!(matches!(
            result,
            Err(SagaError::InvalidState {
                status: SagaStatus::Compensated,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_create_run_twice_fails() {
        let orch = orchestrator();
        let saga_id = SagaId::new();
        orch.create_run(&saga_id, Payload::new()).await.unwrap();
        let result = orch.create_run(&saga_id, Payload::new()).await;
        assert!(matches!(result, Err(SagaError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_compensate_missing_run() {
        let orch = orchestrator();
        let def = SagaDefinition::builder("order").build().unwrap();
        let result = orch.compensate(&SagaId::new(), &def, Payload::new()).await;
        assert!(matches!(result, Err(SagaError::RunNotFound(_))));
    }

    #[test]
    fn test_panic_message_formats() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "step panicked: boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "step panicked: bang");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "step panicked");
    }
}
