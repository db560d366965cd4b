//! Shared value types for the saga orchestration workspace.

pub mod payload;
pub mod types;

pub use payload::{Payload, PayloadError};
pub use types::SagaId;
