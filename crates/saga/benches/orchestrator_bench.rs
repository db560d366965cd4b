use async_trait::async_trait;
use common::{Payload, SagaId};
use criterion::{Criterion, criterion_group, criterion_main};
use run_store::{InMemoryRunStore, RunState, RunStore};
use saga::{
    InMemoryDeliveryService, InMemoryKitchenService, InMemoryPaymentService, Orchestrator,
    OrderItem, OrderWorkflow, PaymentMethod, PlaceOrder, SagaDefinition, Step, StepAction,
    StepCompensation, StepError,
};

struct Noop(&'static str);

#[async_trait]
impl StepAction for Noop {
    async fn execute(&self, payload: &mut Payload) -> Result<(), StepError> {
        payload.insert(self.0, true);
        Ok(())
    }
}

#[async_trait]
impl StepCompensation for Noop {
    async fn compensate(&self, _payload: &Payload) -> Result<(), StepError> {
        Ok(())
    }
}

struct Fail;

#[async_trait]
impl StepAction for Fail {
    async fn execute(&self, _payload: &mut Payload) -> Result<(), StepError> {
        Err(StepError::new("boom"))
    }
}

const STEP_NAMES: [&str; 5] = ["s1", "s2", "s3", "s4", "s5"];

fn definition(with_failure: bool) -> SagaDefinition {
    let mut builder = SagaDefinition::builder("bench");
    for name in STEP_NAMES {
        builder = builder.step(Step::compensable(name, Noop(name)));
    }
    if with_failure {
        builder = builder.step(Step::new("fail", Fail));
    }
    builder.build().unwrap()
}

fn bench_execute_five_steps(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orch = Orchestrator::new(InMemoryRunStore::new());
    let def = definition(false);

    c.bench_function("orchestrator/execute_5_steps", |b| {
        b.iter(|| {
            rt.block_on(async {
                orch.execute(&SagaId::new(), &def, Payload::new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_execute_and_compensate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orch = Orchestrator::new(InMemoryRunStore::new());
    let def = definition(true);

    c.bench_function("orchestrator/execute_5_steps_then_compensate", |b| {
        b.iter(|| {
            rt.block_on(async {
                let outcome = orch
                    .execute(&SagaId::new(), &def, Payload::new())
                    .await
                    .unwrap();
                assert!(!outcome.is_success());
            });
        });
    });
}

fn bench_replay_completed_prefix(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryRunStore::new();
    let saga_id = SagaId::new();

    // All five steps already recorded
    rt.block_on(async {
        let mut run = RunState::new(Payload::new());
        for name in STEP_NAMES {
            run.record_executed(name);
        }
        store.save(&saga_id, &run).await.unwrap();
    });

    let orch = Orchestrator::new(store);
    let def = definition(false);

    c.bench_function("orchestrator/replay_5_executed_steps", |b| {
        b.iter(|| {
            rt.block_on(async {
                orch.execute(&saga_id, &def, Payload::new()).await.unwrap();
            });
        });
    });
}

fn bench_order_workflow(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let workflow = OrderWorkflow::new(
        Orchestrator::new(InMemoryRunStore::new()),
        InMemoryPaymentService::new(),
        InMemoryKitchenService::new(),
        InMemoryDeliveryService::new(),
        None,
    )
    .unwrap();

    c.bench_function("order_workflow/place_and_confirm", |b| {
        b.iter(|| {
            rt.block_on(async {
                let placed = workflow
                    .place_order(PlaceOrder {
                        customer_id: "bench".to_string(),
                        items: vec![OrderItem::new("Burger", 1, 899)],
                        delivery_address: "1 Main St".to_string(),
                        payment_method: PaymentMethod::Cash,
                    })
                    .await
                    .unwrap();
                workflow
                    .confirm_payment(&placed.saga_id, true)
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_execute_five_steps,
    bench_execute_and_compensate,
    bench_replay_completed_prefix,
    bench_order_workflow,
);
criterion_main!(benches);
