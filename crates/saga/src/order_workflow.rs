//! Food order workflow built on the orchestrator.
//!
//! An order runs in two stages. Placing it executes only the `payment` step,
//! which records a pending payment and stops. Staff then confirm or reject
//! the payment: an approval resumes the run with the full
//! `[payment, kitchen, delivery]` definition, whose replay skips the payment
//! step; a rejection compensates the run.

use std::time::Duration;

use async_trait::async_trait;
use common::{Payload, PayloadError, SagaId};
use run_store::{RunState, RunStore, SagaStatus};
use serde::{Deserialize, Serialize};

use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};
use crate::orchestrator::{Orchestrator, RecoveredRun, RecoveryAction, SagaOutcome};
use crate::services::{
    DeliveryService, KitchenService, PaymentMethod, PaymentService, PaymentStatus,
};
use crate::step::{Step, StepAction, StepCompensation, StepError};

/// Saga name used for order runs.
pub const SAGA_NAME: &str = "order_orchestration";

/// Step name: create the pending payment.
pub const STEP_PAYMENT: &str = "payment";

/// Step name: open the kitchen ticket.
pub const STEP_KITCHEN: &str = "kitchen";

/// Step name: book a driver.
pub const STEP_DELIVERY: &str = "delivery";

/// Payload keys used by the order steps.
pub mod keys {
    pub const ORDER_ID: &str = "order_id";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const ITEMS: &str = "items";
    pub const TOTAL_AMOUNT_CENTS: &str = "total_amount_cents";
    pub const DELIVERY_ADDRESS: &str = "delivery_address";
    pub const PAYMENT_METHOD: &str = "payment_method";
    pub const PAYMENT_ID: &str = "payment_id";
    pub const KITCHEN_ORDER_ID: &str = "kitchen_order_id";
    pub const DELIVERY_ID: &str = "delivery_id";
    pub const DRIVER_ID: &str = "driver_id";
}

/// A line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub price_cents: u64,
}

impl OrderItem {
    /// Creates an order line priced in cents.
    pub fn new(name: impl Into<String>, quantity: u32, price_cents: u64) -> Self {
        Self {
            name: name.into(),
            quantity,
            price_cents,
        }
    }

    /// Returns price times quantity, or None if it does not fit in a `u64`.
    pub fn line_total_cents(&self) -> Option<u64> {
        self.price_cents.checked_mul(u64::from(self.quantity))
    }
}

/// Request to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub delivery_address: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl PlaceOrder {
    /// Returns the sum of all line totals.
    ///
    /// Fails with [`PayloadError::Invalid`] on `items` when the amount
    /// overflows.
    pub fn total_amount_cents(&self) -> Result<u64> {
        self.items
            .iter()
            .try_fold(0u64, |total, item| {
                item.line_total_cents()
                    .and_then(|line| total.checked_add(line))
            })
            .ok_or_else(|| {
                SagaError::Payload(PayloadError::Invalid {
                    key: keys::ITEMS.to_string(),
                    reason: "order total overflows".to_string(),
                })
            })
    }

    /// Builds the initial saga payload for this order.
    pub fn into_payload(self, order_id: &str) -> Result<Payload> {
        let total = self.total_amount_cents()?;
        let mut payload = Payload::new();
        payload.insert(keys::ORDER_ID, order_id);
        payload.insert(keys::CUSTOMER_ID, self.customer_id);
        payload.insert_serialized(keys::ITEMS, &self.items)?;
        payload.insert(keys::TOTAL_AMOUNT_CENTS, total);
        payload.insert(keys::DELIVERY_ADDRESS, self.delivery_address);
        payload.insert_serialized(keys::PAYMENT_METHOD, &self.payment_method)?;
        Ok(payload)
    }
}

/// Order status as seen by the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for payment confirmation.
    Pending,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Derives the order status from its saga run.
    pub fn from_run(run: &RunState) -> Self {
        match run.status {
            SagaStatus::Compensating | SagaStatus::Compensated => OrderStatus::Cancelled,
            SagaStatus::Completed if run.has_executed(STEP_DELIVERY) => OrderStatus::Delivered,
            _ => OrderStatus::Pending,
        }
    }
}

/// Result of placing an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub saga_id: SagaId,
    pub order_id: String,
    pub total_amount_cents: u64,
    pub status: OrderStatus,
}

/// Creates the pending payment; compensation refunds it.
pub struct ProcessPayment<P> {
    payments: P,
}

#[async_trait]
impl<P: PaymentService> StepAction for ProcessPayment<P> {
    async fn execute(&self, payload: &mut Payload) -> std::result::Result<(), StepError> {
        if payload.contains(keys::PAYMENT_ID) {
            return Ok(());
        }

        let order_id = payload.require_str(keys::ORDER_ID)?.to_string();
        let amount: u64 = payload.require(keys::TOTAL_AMOUNT_CENTS)?;
        let method: PaymentMethod = payload.require(keys::PAYMENT_METHOD)?;

        let payment_id = self
            .payments
            .create_pending(&order_id, amount, method)
            .await?;
        tracing::info!(%order_id, %payment_id, "payment pending confirmation");
        payload.insert(keys::PAYMENT_ID, payment_id);
        Ok(())
    }
}

#[async_trait]
impl<P: PaymentService> StepCompensation for ProcessPayment<P> {
    async fn compensate(&self, payload: &Payload) -> std::result::Result<(), StepError> {
        let Some(payment_id) = payload.get_str(keys::PAYMENT_ID) else {
            return Ok(());
        };
        let status = self.payments.refund(payment_id).await?;
        tracing::info!(%payment_id, %status, "payment compensated");
        Ok(())
    }
}

/// Opens a kitchen ticket; compensation cancels it.
pub struct PrepareKitchen<K> {
    kitchen: K,
}

#[async_trait]
impl<K: KitchenService> StepAction for PrepareKitchen<K> {
    async fn execute(&self, payload: &mut Payload) -> std::result::Result<(), StepError> {
        let order_id = payload.require_str(keys::ORDER_ID)?.to_string();
        let items: Vec<OrderItem> = payload.require(keys::ITEMS)?;

        let kitchen_order_id = self.kitchen.create_ticket(&order_id, &items).await?;
        tracing::info!(%order_id, %kitchen_order_id, "kitchen ticket created");
        payload.insert(keys::KITCHEN_ORDER_ID, kitchen_order_id);
        Ok(())
    }
}

#[async_trait]
impl<K: KitchenService> StepCompensation for PrepareKitchen<K> {
    async fn compensate(&self, payload: &Payload) -> std::result::Result<(), StepError> {
        if let Some(kitchen_order_id) = payload.get_str(keys::KITCHEN_ORDER_ID) {
            self.kitchen.cancel(kitchen_order_id).await?;
        }
        Ok(())
    }
}

/// Books a driver; compensation cancels the delivery.
pub struct ArrangeDelivery<D> {
    delivery: D,
}

#[async_trait]
impl<D: DeliveryService> StepAction for ArrangeDelivery<D> {
    async fn execute(&self, payload: &mut Payload) -> std::result::Result<(), StepError> {
        let order_id = payload.require_str(keys::ORDER_ID)?.to_string();
        let address = payload.require_str(keys::DELIVERY_ADDRESS)?.to_string();

        let assignment = self.delivery.arrange(&order_id, &address).await?;
        tracing::info!(
            %order_id,
            delivery_id = %assignment.delivery_id,
            driver_id = %assignment.driver_id,
            "delivery arranged"
        );
        payload.insert(keys::DELIVERY_ID, assignment.delivery_id);
        payload.insert(keys::DRIVER_ID, assignment.driver_id);
        Ok(())
    }
}

#[async_trait]
impl<D: DeliveryService> StepCompensation for ArrangeDelivery<D> {
    async fn compensate(&self, payload: &Payload) -> std::result::Result<(), StepError> {
        if let Some(delivery_id) = payload.get_str(keys::DELIVERY_ID) {
            self.delivery.cancel(delivery_id).await?;
        }
        Ok(())
    }
}

/// Places orders and drives them through payment, kitchen and delivery.
///
/// The kitchen and delivery services live inside the step handlers; the
/// workflow keeps the payment service to apply staff decisions.
pub struct OrderWorkflow<S, P>
where
    S: RunStore,
{
    orchestrator: Orchestrator<S>,
    payments: P,
    payment_stage: SagaDefinition,
    fulfillment: SagaDefinition,
}

impl<S, P> OrderWorkflow<S, P>
where
    S: RunStore,
    P: PaymentService + Clone + 'static,
{
    /// Creates a workflow over the given orchestrator and services.
    ///
    /// `step_timeout` bounds every step action when set.
    pub fn new<K, D>(
        orchestrator: Orchestrator<S>,
        payments: P,
        kitchen: K,
        delivery: D,
        step_timeout: Option<Duration>,
    ) -> Result<Self>
    where
        K: KitchenService + 'static,
        D: DeliveryService + 'static,
    {
        let bounded = |step: Step| match step_timeout {
            Some(limit) => step.with_timeout(limit),
            None => step,
        };
        let payment_step = bounded(Step::compensable(
            STEP_PAYMENT,
            ProcessPayment {
                payments: payments.clone(),
            },
        ));

        let payment_stage = SagaDefinition::builder(SAGA_NAME)
            .step(payment_step.clone())
            .build()?;
        let fulfillment = SagaDefinition::builder(SAGA_NAME)
            .step(payment_step)
            .step(bounded(Step::compensable(
                STEP_KITCHEN,
                PrepareKitchen { kitchen },
            )))
            .step(bounded(Step::compensable(
                STEP_DELIVERY,
                ArrangeDelivery { delivery },
            )))
            .build()?;

        Ok(Self {
            orchestrator,
            payments,
            payment_stage,
            fulfillment,
        })
    }

    /// Returns the orchestrator.
    pub fn orchestrator(&self) -> &Orchestrator<S> {
        &self.orchestrator
    }

    /// Returns the full `[payment, kitchen, delivery]` definition.
    pub fn definition(&self) -> &SagaDefinition {
        &self.fulfillment
    }

    /// Creates the run for `order` and records its pending payment.
    #[tracing::instrument(skip(self, order), fields(customer_id = %order.customer_id))]
    pub async fn place_order(&self, order: PlaceOrder) -> Result<PlacedOrder> {
        if order.items.is_empty() {
            return Err(SagaError::Payload(PayloadError::Invalid {
                key: keys::ITEMS.to_string(),
                reason: "order has no items".to_string(),
            }));
        }

        let saga_id = SagaId::new();
        let order_id = uuid::Uuid::new_v4().to_string();
        let total_amount_cents = order.total_amount_cents()?;
        let payload = order.into_payload(&order_id)?;

        self.orchestrator
            .create_run(&saga_id, payload.clone())
            .await?;
        let outcome = self
            .orchestrator
            .execute(&saga_id, &self.payment_stage, payload)
            .await?;

        let status = match &outcome {
            SagaOutcome::Completed => OrderStatus::Pending,
            SagaOutcome::Failed { error } => {
                tracing::warn!(%saga_id, %order_id, %error, "order cancelled while placing");
                OrderStatus::Cancelled
            }
        };
        tracing::info!(%saga_id, %order_id, total_amount_cents, ?status, "order placed");

        Ok(PlacedOrder {
            saga_id,
            order_id,
            total_amount_cents,
            status,
        })
    }

    /// Applies the staff decision on the order's pending payment.
    ///
    /// An approval completes the payment and runs the remaining steps; a
    /// rejection marks it failed and compensates the run. Repeating a call
    /// after a run store failure finds the payment already in the decided
    /// status and carries on with the saga.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, saga_id: &SagaId, approved: bool) -> Result<OrderStatus> {
        let run = self
            .orchestrator
            .get_run(saga_id)
            .await?
            .ok_or_else(|| SagaError::RunNotFound(saga_id.clone()))?;

        if !run.status.can_execute() {
            return Err(SagaError::InvalidState {
                saga_id: saga_id.clone(),
                status: run.status,
                operation: "confirm payment for",
            });
        }
        let payment_id = run.payload.require_str(keys::PAYMENT_ID)?;
        let current = self.payments.status(payment_id).await?;

        if !approved {
            if current == Some(PaymentStatus::Failed) {
                tracing::info!(%saga_id, %payment_id, "payment already rejected");
            } else {
                self.payments.mark_failed(payment_id).await?;
            }
            tracing::warn!(%saga_id, %payment_id, "payment rejected, cancelling order");
            self.orchestrator
                .compensate(saga_id, &self.fulfillment, Payload::new())
                .await?;
            return Ok(OrderStatus::Cancelled);
        }

        if current == Some(PaymentStatus::Completed) {
            tracing::info!(%saga_id, %payment_id, "payment already confirmed");
        } else {
            self.payments.confirm(payment_id).await?;
        }
        tracing::info!(%saga_id, %payment_id, "payment confirmed, resuming order");

        self.fulfill(saga_id).await
    }

    /// Finishes orders interrupted by a crash or a run store failure.
    ///
    /// Runs left `executing` resume with the stage their payment has reached:
    /// the payment stage while staff have not confirmed it, the full
    /// definition once they have. `completed` runs whose payment is confirmed
    /// but which were never delivered are fulfilled. Runs left `compensating`
    /// finish their rollback. A failure on one run is reported in its entry.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<Vec<RecoveredRun>> {
        let store = self.orchestrator.store();
        let mut report = Vec::new();

        for (saga_id, run) in store.list_by_status(SagaStatus::Executing).await? {
            let result = match self.payment_confirmed(&run).await {
                Ok(true) => self.resume(&saga_id, &self.fulfillment).await,
                Ok(false) => self.resume(&saga_id, &self.payment_stage).await,
                Err(e) => Err(e),
            };
            report.push(RecoveredRun { saga_id, result });
        }

        for (saga_id, run) in store.list_by_status(SagaStatus::Completed).await? {
            if run.has_executed(STEP_DELIVERY) {
                continue;
            }
            let result = match self.payment_confirmed(&run).await {
                Ok(true) => self.resume(&saga_id, &self.fulfillment).await,
                Ok(false) => continue,
                Err(e) => Err(e),
            };
            report.push(RecoveredRun { saga_id, result });
        }

        for (saga_id, _) in store.list_by_status(SagaStatus::Compensating).await? {
            let result = self
                .orchestrator
                .compensate(&saga_id, &self.fulfillment, Payload::new())
                .await
                .map(RecoveryAction::Compensated);
            report.push(RecoveredRun { saga_id, result });
        }

        tracing::info!(runs = report.len(), "order recovery sweep finished");
        Ok(report)
    }

    /// Records the payment step and drives the remaining steps.
    async fn fulfill(&self, saga_id: &SagaId) -> Result<OrderStatus> {
        self.orchestrator
            .record_step_completed(saga_id, STEP_PAYMENT)
            .await?;
        let outcome = self
            .orchestrator
            .execute(saga_id, &self.fulfillment, Payload::new())
            .await?;

        Ok(match outcome {
            SagaOutcome::Completed => OrderStatus::Delivered,
            SagaOutcome::Failed { .. } => OrderStatus::Cancelled,
        })
    }

    async fn resume(
        &self,
        saga_id: &SagaId,
        definition: &SagaDefinition,
    ) -> Result<RecoveryAction> {
        self.orchestrator
            .execute(saga_id, definition, Payload::new())
            .await
            .map(RecoveryAction::Resumed)
    }

    /// Returns true once staff have approved the run's payment.
    async fn payment_confirmed(&self, run: &RunState) -> Result<bool> {
        let Some(payment_id) = run.payload.get_str(keys::PAYMENT_ID) else {
            return Ok(false);
        };
        Ok(self.payments.status(payment_id).await? == Some(PaymentStatus::Completed))
    }

    /// Returns the current status of an order.
    pub async fn order_status(&self, saga_id: &SagaId) -> Result<OrderStatus> {
        let run = self
            .orchestrator
            .get_run(saga_id)
            .await?
            .ok_or_else(|| SagaError::RunNotFound(saga_id.clone()))?;
        Ok(OrderStatus::from_run(&run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> PlaceOrder {
        PlaceOrder {
            customer_id: "cust-1".to_string(),
            items: vec![OrderItem::new("Ramen", 2, 1200), OrderItem::new("Gyoza", 1, 600)],
            delivery_address: "1 Main St".to_string(),
            payment_method: PaymentMethod::CreditCard,
        }
    }

    #[test]
    fn test_total_amount() {
        assert_eq!(order().total_amount_cents().unwrap(), 3000);
    }

    #[test]
    fn test_total_amount_overflow_is_rejected() {
        let mut order = order();
        order.items = vec![OrderItem::new("Caviar", 3, u64::MAX / 2)];
        assert_eq!(order.items[0].line_total_cents(), None);
        assert!(matches!(
            order.total_amount_cents(),
            Err(SagaError::Payload(PayloadError::Invalid { ref key, .. })) if key == keys::ITEMS
        ));

        order.items = vec![
            OrderItem::new("Caviar", 1, u64::MAX),
            OrderItem::new("Bread", 1, 1),
        ];
        assert!(order.total_amount_cents().is_err());
        assert!(order.into_payload("ORD-1").is_err());
    }

    #[test]
    fn test_into_payload() {
        let payload = order().into_payload("ORD-1").unwrap();
        assert_eq!(payload.get_str(keys::ORDER_ID), Some("ORD-1"));
        assert_eq!(payload.require::<u64>(keys::TOTAL_AMOUNT_CENTS).unwrap(), 3000);
        assert_eq!(payload.get_str(keys::PAYMENT_METHOD), Some("credit_card"));
        let items: Vec<OrderItem> = payload.require(keys::ITEMS).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_status_from_run() {
        let mut run = RunState::new(Payload::new());
        assert_eq!(OrderStatus::from_run(&run), OrderStatus::Pending);

        run.record_executed(STEP_PAYMENT);
        run.transition(SagaStatus::Completed);
        assert_eq!(OrderStatus::from_run(&run), OrderStatus::Pending);

        run.record_executed(STEP_KITCHEN);
        run.record_executed(STEP_DELIVERY);
        assert_eq!(OrderStatus::from_run(&run), OrderStatus::Delivered);

        run.transition(SagaStatus::Compensated);
        assert_eq!(OrderStatus::from_run(&run), OrderStatus::Cancelled);
    }
}
