//! Saga steps: a named action plus an optional compensation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Payload, PayloadError};
use thiserror::Error;

/// Business failure reported by a step.
///
/// Returning this from an action stops forward progress and starts
/// compensation; returning it from a compensation is recorded and the
/// rollback continues with the next step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct StepError {
    reason: String,
}

impl StepError {
    /// Creates a failure with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the failure reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<PayloadError> for StepError {
    fn from(e: PayloadError) -> Self {
        StepError::new(e.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::new(e.to_string())
    }
}

/// Forward half of a step.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Performs the step's effect.
    ///
    /// The action may write fields into `payload` for later steps; those
    /// writes are persisted together with the step's completion.
    async fn execute(&self, payload: &mut Payload) -> Result<(), StepError>;
}

/// Undo half of a step.
#[async_trait]
pub trait StepCompensation: Send + Sync {
    /// Reverses the effect of a previously successful `execute`.
    async fn compensate(&self, payload: &Payload) -> Result<(), StepError>;
}

/// A named unit of work inside a saga definition.
#[derive(Clone)]
pub struct Step {
    name: String,
    action: Arc<dyn StepAction>,
    compensation: Option<Arc<dyn StepCompensation>>,
    timeout: Option<Duration>,
}

impl Step {
    /// Creates a step with no compensation.
    pub fn new(name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
            compensation: None,
            timeout: None,
        }
    }

    /// Creates a step whose handler implements both halves.
    pub fn compensable<H>(name: impl Into<String>, handler: H) -> Self
    where
        H: StepAction + StepCompensation + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            name: name.into(),
            action: handler.clone(),
            compensation: Some(handler),
            timeout: None,
        }
    }

    /// Attaches a compensation.
    pub fn with_compensation(mut self, compensation: impl StepCompensation + 'static) -> Self {
        self.compensation = Some(Arc::new(compensation));
        self
    }

    /// Bounds how long the action may run before it counts as failed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the action.
    pub fn action(&self) -> &dyn StepAction {
        self.action.as_ref()
    }

    /// Returns the compensation, if one is defined.
    pub fn compensation(&self) -> Option<&dyn StepCompensation> {
        self.compensation.as_deref()
    }

    /// Returns the action timeout, if one is set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("compensable", &self.compensation.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
