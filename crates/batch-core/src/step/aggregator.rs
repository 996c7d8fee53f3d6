//! A single aggregating step in the chain (spec §4.2).

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::user_fn::StepFn;
use crate::errors::EngineError;
use crate::model::{SerStatus, StepExecutionResult};
use crate::persistence::KvNamespaces;

#[derive(Default)]
struct Buffer {
    records: Vec<String>,
    payloads: Vec<Value>,
}

/// What a step call produced, from [`super::chain::StepChain`]'s point of
/// view.
///
/// `Parked` is a result the controller should account for and stop on:
/// the records either sit in this step's buffer (`Accumulating`), are
/// finished (terminal `Successful`), or failed. `Forward` carries a
/// non-terminal `Successful` SER the chain should hand to the next step in
/// the same dispatch — it is never persisted on its own.
pub enum StepOutcome {
    Parked(StepExecutionResult),
    Forward(StepExecutionResult),
}

/// One named point in the chain: buffers incoming SERs until it has
/// `aggregation_quantity` of them, then hands the batch to `user_fn`.
pub struct AggregatorStep {
    /// 1-based position in the chain; assigned by the chain builder.
    pub(crate) step_index: usize,
    pub name: String,
    pub aggregation_quantity: usize,
    user_fn: Arc<dyn StepFn>,
    buffer: Mutex<Buffer>,
}

impl AggregatorStep {
    pub fn new(name: impl Into<String>, aggregation_quantity: usize, user_fn: Arc<dyn StepFn>) -> Self {
        Self {
            step_index: 0,
            name: name.into(),
            aggregation_quantity: aggregation_quantity.max(1),
            user_fn,
            buffer: Mutex::new(Buffer::default()),
        }
    }

    pub fn pending_record_count(&self) -> usize {
        self.buffer.lock().records.len()
    }

    /// Normal arrival path: append `incoming` to the buffer and dispatch
    /// only once the buffer is full.
    pub async fn execute(
        &self,
        incoming: StepExecutionResult,
        persistence: &dyn KvNamespaces,
        chain_len: usize,
    ) -> Result<StepOutcome, EngineError> {
        let bad_input = !matches!(incoming.status, SerStatus::Successful)
            || incoming.output_payload.is_none()
            || incoming.dependent_records.is_empty();

        if bad_input {
            let error = EngineError::BadInput(format!(
                "step '{}' received a non-successful or empty upstream SER",
                self.name
            ));
            let ser = StepExecutionResult::failed(self.step_index, incoming.dependent_records, error)
                .publish(persistence, chain_len)
                .await?;
            return Ok(StepOutcome::Parked(ser));
        }

        let dispatch = {
            let mut buf = self.buffer.lock();
            buf.records.extend(incoming.dependent_records);
            buf.payloads.push(incoming.output_payload.expect("checked above"));
            if buf.payloads.len() < self.aggregation_quantity {
                None
            } else {
                Some((std::mem::take(&mut buf.records), std::mem::take(&mut buf.payloads)))
            }
        };

        match dispatch {
            None => {
                let (records, payloads) = {
                    let buf = self.buffer.lock();
                    (buf.records.clone(), buf.payloads.clone())
                };
                let ser = StepExecutionResult::accumulating(self.step_index, records, payloads)
                    .publish(persistence, chain_len)
                    .await?;
                Ok(StepOutcome::Parked(ser))
            }
            Some((records, payloads)) => self.run_batch(records, payloads, persistence, chain_len).await,
        }
    }

    /// Forced flush used by drain and retry (spec §4.4.2, §4.4.3): dispatch
    /// whatever is currently buffered regardless of `aggregation_quantity`.
    /// Returns `None` if the buffer is empty.
    pub async fn execute_client_step(
        &self,
        persistence: &dyn KvNamespaces,
        chain_len: usize,
    ) -> Option<Result<StepOutcome, EngineError>> {
        let taken = {
            let mut buf = self.buffer.lock();
            if buf.records.is_empty() {
                None
            } else {
                Some((std::mem::take(&mut buf.records), std::mem::take(&mut buf.payloads)))
            }
        };
        let (records, payloads) = taken?;
        Some(self.run_batch(records, payloads, persistence, chain_len).await)
    }

    /// Seeds this step's buffer from a recovered checkpoint (spec §4.4.3).
    pub fn inject_recovered_state(&self, records: Vec<String>, payloads: Vec<Value>) {
        let mut buf = self.buffer.lock();
        buf.records.extend(records);
        buf.payloads.extend(payloads);
    }

    async fn run_batch(
        &self,
        records: Vec<String>,
        payloads: Vec<Value>,
        persistence: &dyn KvNamespaces,
        chain_len: usize,
    ) -> Result<StepOutcome, EngineError> {
        match self.user_fn.call(payloads.clone()).await {
            Ok(output) => {
                StepExecutionResult::processing(self.step_index, records.clone(), payloads.clone(), output.clone())
                    .publish(persistence, chain_len)
                    .await?;

                if self.step_index == chain_len {
                    let ser = StepExecutionResult::successful(self.step_index, records, output)
                        .publish(persistence, chain_len)
                        .await?;
                    Ok(StepOutcome::Parked(ser))
                } else {
                    let forward = StepExecutionResult {
                        id: None,
                        step_index: self.step_index,
                        status: SerStatus::Successful,
                        dependent_records: records,
                        acc_payload: payloads,
                        output_payload: Some(output),
                    };
                    Ok(StepOutcome::Forward(forward))
                }
            }
            Err(message) => {
                let ser = StepExecutionResult::failed(self.step_index, records, EngineError::UserStep(message))
                    .publish(persistence, chain_len)
                    .await?;
                Ok(StepOutcome::Parked(ser))
            }
        }
    }
}
