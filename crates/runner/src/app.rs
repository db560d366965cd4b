//! Wiring of the order workflow over a run store.

use run_store::RunStore;
use saga::{
    InMemoryDeliveryService, InMemoryKitchenService, InMemoryPaymentService, Orchestrator,
    OrderItem, OrderStatus, OrderWorkflow, PaymentMethod, PlaceOrder, PlacedOrder,
    RecoveryAction, Result,
};

use crate::config::Config;

/// Order workflow backed by the in-memory collaborating services.
pub type AppWorkflow<S> = OrderWorkflow<S, InMemoryPaymentService>;

/// What a single runner invocation did.
#[derive(Debug)]
pub struct RunReport {
    /// Interrupted runs found by the recovery sweep.
    pub recovered: usize,
    pub placed: PlacedOrder,
    pub final_status: OrderStatus,
}

/// Builds the order workflow over `store`.
pub fn build_workflow<S: RunStore>(store: S, config: &Config) -> Result<AppWorkflow<S>> {
    OrderWorkflow::new(
        Orchestrator::new(store),
        InMemoryPaymentService::new(),
        InMemoryKitchenService::new(),
        InMemoryDeliveryService::new(),
        config.step_timeout,
    )
}

/// The order placed by the runner.
pub fn sample_order() -> PlaceOrder {
    PlaceOrder {
        customer_id: "walk-in".to_string(),
        items: vec![
            OrderItem::new("Margherita pizza", 1, 1150),
            OrderItem::new("Lemonade", 2, 300),
        ],
        delivery_address: "12 Harbour Road".to_string(),
        payment_method: PaymentMethod::Cash,
    }
}

/// Finishes interrupted runs, then places and confirms one order.
pub async fn run<S: RunStore>(store: S, config: &Config) -> Result<RunReport> {
    let workflow = build_workflow(store, config)?;

    let recovered = workflow.recover().await?;
    for entry in &recovered {
        match &entry.result {
            Ok(RecoveryAction::Resumed(outcome)) => {
                tracing::info!(saga_id = %entry.saga_id, ?outcome, "interrupted run resumed");
            }
            Ok(RecoveryAction::Compensated(records)) => {
                tracing::info!(
                    saga_id = %entry.saga_id,
                    compensations = records.len(),
                    "interrupted rollback finished"
                );
            }
            Err(e) => {
                tracing::warn!(saga_id = %entry.saga_id, error = %e, "failed to recover run");
            }
        }
    }

    let placed = workflow.place_order(sample_order()).await?;
    tracing::info!(
        saga_id = %placed.saga_id,
        order_id = %placed.order_id,
        total_amount_cents = placed.total_amount_cents,
        "order awaiting payment confirmation"
    );

    let final_status = workflow.confirm_payment(&placed.saga_id, true).await?;
    tracing::info!(saga_id = %placed.saga_id, ?final_status, "order finished");

    Ok(RunReport {
        recovered: recovered.len(),
        placed,
        final_status,
    })
}
