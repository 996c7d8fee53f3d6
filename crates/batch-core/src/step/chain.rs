//! The ordered sequence of aggregator steps a record's SER travels through
//! (spec §4, Design Notes: steps live in a contiguous array indexed by
//! `step_index` rather than linking to a successor directly).

use super::aggregator::{AggregatorStep, StepOutcome};
use crate::errors::EngineError;
use crate::model::StepExecutionResult;
use crate::persistence::KvNamespaces;

pub struct StepChain {
    steps: Vec<AggregatorStep>,
}

impl StepChain {
    pub(crate) fn new(mut steps: Vec<AggregatorStep>) -> Self {
        for (i, step) in steps.iter_mut().enumerate() {
            step.step_index = i + 1;
        }
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    /// Product of every step's aggregation quantity: the number of raw
    /// records that can be in flight through the chain before the first
    /// one reaches the end (spec §5).
    pub fn pipeline_fan_in(&self) -> usize {
        self.steps.iter().map(|s| s.aggregation_quantity.max(1)).product()
    }

    pub fn records_in_chain(&self) -> usize {
        self.steps.iter().map(|s| s.pending_record_count()).sum()
    }

    /// Drives `incoming` through the chain starting at `incoming.step_index`,
    /// following `Forward` outcomes until a step parks it.
    pub async fn dispatch(
        &self,
        persistence: &dyn KvNamespaces,
        incoming: StepExecutionResult,
    ) -> Result<StepExecutionResult, EngineError> {
        self.dispatch_from(incoming, persistence).await
    }

    /// Forces a flush of every step with a non-empty buffer, tail first,
    /// cascading any output forward through the remaining steps (spec
    /// §4.4.2, §4.4.3). Returns every terminal SER produced along the way.
    pub async fn force_tail(&self, persistence: &dyn KvNamespaces) -> Result<Vec<StepExecutionResult>, EngineError> {
        let mut results = Vec::new();
        for idx in (0..self.steps.len()).rev() {
            let Some(outcome) = self.steps[idx].execute_client_step(persistence, self.steps.len()).await else {
                continue;
            };
            match outcome? {
                StepOutcome::Parked(ser) => results.push(ser),
                StepOutcome::Forward(ser) => {
                    let ser = self.dispatch_from(ser, persistence).await?;
                    results.push(ser);
                }
            }
        }
        Ok(results)
    }

    /// Seeds step `step_index` (1-based) with recovered buffer contents.
    pub fn inject_recovered_state(&self, step_index: usize, records: Vec<String>, payloads: Vec<serde_json::Value>) {
        if let Some(step) = self.steps.get(step_index.saturating_sub(1)) {
            step.inject_recovered_state(records, payloads);
        }
    }

    async fn dispatch_from(
        &self,
        mut ser: StepExecutionResult,
        persistence: &dyn KvNamespaces,
    ) -> Result<StepExecutionResult, EngineError> {
        loop {
            let idx = ser.step_index;
            let step = self
                .steps
                .get(idx)
                .ok_or_else(|| EngineError::Internal(format!("no step at index {idx}")))?;
            match step.execute(ser, persistence, self.steps.len()).await? {
                StepOutcome::Parked(final_ser) => return Ok(final_ser),
                StepOutcome::Forward(next_ser) => ser = next_ser,
            }
        }
    }
}
