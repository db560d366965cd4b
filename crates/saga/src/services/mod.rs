//! External service traits and in-memory implementations for order steps.

pub mod delivery;
pub mod kitchen;
pub mod payment;

use thiserror::Error;

pub use delivery::{DeliveryAssignment, DeliveryService, DeliveryStatus, InMemoryDeliveryService};
pub use kitchen::{InMemoryKitchenService, KitchenService, KitchenTicketStatus};
pub use payment::{InMemoryPaymentService, PaymentMethod, PaymentService, PaymentStatus};

/// Errors returned by the collaborating services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The service declined the request.
    #[error("{0}")]
    Rejected(String),

    /// The referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The record is not in a state that allows the request.
    #[error("{kind} {id} is {status}, expected {expected}")]
    InvalidState {
        kind: &'static str,
        id: String,
        status: String,
        expected: &'static str,
    },
}

impl From<ServiceError> for crate::step::StepError {
    fn from(e: ServiceError) -> Self {
        crate::step::StepError::new(e.to_string())
    }
}
