//! Saga orchestration with persisted progress.
//!
//! A [`SagaDefinition`] is an ordered list of [`Step`]s, each an action plus
//! an optional compensation. The [`Orchestrator`] drives a definition for one
//! run identifier, persisting progress to a [`RunStore`](run_store::RunStore)
//! after every step:
//!
//! 1. Steps already recorded as executed are skipped, so re-invoking a run
//!    resumes where it left off.
//! 2. If a step fails, the executed steps are compensated in reverse order.
//!    Compensation is best effort and never aborts the rollback.
//!
//! [`order_workflow`] builds a food order flow (payment, kitchen, delivery)
//! on top of the orchestrator.

pub mod definition;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod order_workflow;
pub mod services;
pub mod step;

pub use definition::{SagaDefinition, SagaDefinitionBuilder};
pub use error::{DefinitionError, Result, SagaError};
pub use locks::SagaLocks;
pub use orchestrator::{Orchestrator, RecoveredRun, RecoveryAction, SagaOutcome};
pub use order_workflow::{OrderItem, OrderStatus, OrderWorkflow, PlaceOrder, PlacedOrder};
pub use services::{
    DeliveryAssignment, DeliveryService, DeliveryStatus, InMemoryDeliveryService,
    InMemoryKitchenService, InMemoryPaymentService, KitchenService, KitchenTicketStatus,
    PaymentMethod, PaymentService, PaymentStatus, ServiceError,
};
pub use step::{Step, StepAction, StepCompensation, StepError};
