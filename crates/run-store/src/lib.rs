//! Run store for saga orchestration.
//!
//! Each saga run is persisted as a single record keyed by its [`SagaId`]:
//! status, payload snapshot, the ordered list of executed steps, and the
//! failure/compensation audit trail. Backends only need per-key atomic
//! reads and writes.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod run;
pub mod status;
pub mod store;

pub use common::{Payload, SagaId};
pub use error::{Result, RunStoreError};
pub use memory::InMemoryRunStore;
pub use postgres::PostgresRunStore;
pub use run::{CompensationOutcome, CompensationRecord, RunState, StepFailure};
pub use status::SagaStatus;
pub use store::{RunStore, RunStoreExt};
