//! Immutable saga definitions.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::DefinitionError;
use crate::step::Step;

/// An ordered, immutable list of uniquely named steps.
///
/// Built once per logical workflow and shared by reference with the
/// orchestrator. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct SagaDefinition {
    name: String,
    steps: Arc<[Step]>,
}

impl SagaDefinition {
    /// Starts building a definition.
    pub fn builder(name: impl Into<String>) -> SagaDefinitionBuilder {
        SagaDefinitionBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Returns the workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Looks up a step by name.
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Returns the step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the definition has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks that recorded progress can be resumed with this definition.
    ///
    /// The executed steps that this definition knows about must be exactly
    /// its leading steps, in the same order. Executed names the definition
    /// does not contain are ignored, so a later stage may drop steps that
    /// already ran.
    pub fn check_progress(&self, executed: &[String]) -> Result<(), DefinitionError> {
        let known: Vec<&str> = executed
            .iter()
            .map(String::as_str)
            .filter(|name| self.step(name).is_some())
            .collect();

        let is_prefix = self
            .steps
            .iter()
            .zip(&known)
            .all(|(step, name)| step.name() == *name);

        if is_prefix {
            Ok(())
        } else {
            Err(DefinitionError::ProgressMismatch {
                saga: self.name.clone(),
                executed: executed.to_vec(),
            })
        }
    }
}

/// Builder for [`SagaDefinition`].
#[derive(Debug)]
pub struct SagaDefinitionBuilder {
    name: String,
    steps: Vec<Step>,
}

impl SagaDefinitionBuilder {
    /// Appends a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Validates step names and freezes the definition.
    pub fn build(self) -> Result<SagaDefinition, DefinitionError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name().is_empty() {
                return Err(DefinitionError::EmptyStepName { saga: self.name });
            }
            if !seen.insert(step.name()) {
                return Err(DefinitionError::DuplicateStep {
                    saga: self.name.clone(),
                    step: step.name().to_string(),
                });
            }
        }

        Ok(SagaDefinition {
            name: self.name,
            steps: self.steps.into(),
        })
    }
}
