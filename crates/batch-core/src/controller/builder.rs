//! Compile-time-light builder for assembling a chain and a persistence
//! context into a runnable [`super::job::BatchJob`] (spec §6).

use std::collections::HashSet;
use std::sync::Arc;

use super::job::BatchJob;
use crate::errors::EngineError;
use crate::persistence::KvNamespaces;
use crate::step::{AggregatorStep, StepChain};

/// Accumulates a named chain of steps against a persistence backend.
///
/// `persistence` is supplied already-opened: the builder has no opinion on
/// whether it is in-memory or backed by a real store, and no opinion on
/// run-directory layout — that's the backend's concern.
pub struct BatchJobBuilder<P: KvNamespaces> {
    name: Option<String>,
    concurrency_multiplier: usize,
    steps: Vec<AggregatorStep>,
    persistence: Arc<P>,
}

impl<P: KvNamespaces + 'static> BatchJobBuilder<P> {
    pub fn new(persistence: P) -> Self {
        Self { name: None, concurrency_multiplier: 1, steps: Vec::new(), persistence: Arc::new(persistence) }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn concurrency_multiplier(mut self, multiplier: usize) -> Self {
        self.concurrency_multiplier = multiplier;
        self
    }

    pub fn add_step(mut self, step: AggregatorStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<BatchJob<P>, EngineError> {
        let name = self
            .name
            .ok_or_else(|| EngineError::Configuration("batch job requires a name".into()))?;

        if self.steps.is_empty() {
            return Err(EngineError::Configuration("batch job requires at least one step".into()));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.clone()) {
                return Err(EngineError::Configuration(format!("duplicate step name '{}'", step.name)));
            }
        }

        if self.concurrency_multiplier == 0 {
            return Err(EngineError::Configuration("concurrency_multiplier must be at least 1".into()));
        }

        let chain = StepChain::new(self.steps);
        Ok(BatchJob::new(name, self.concurrency_multiplier, chain, self.persistence))
    }
}
