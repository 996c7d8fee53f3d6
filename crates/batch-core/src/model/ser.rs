//! Step Execution Result: the unit of state the chain passes between
//! aggregator steps and the only thing the checkpoint protocol persists
//! (spec §3, §4.3).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::persistence::KvNamespaces;

/// Lifecycle state of a [`StepExecutionResult`].
///
/// `Failed` carries the error that caused the record's lineage to stop
/// advancing; every other variant carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SerStatus {
    Accumulating,
    Processing,
    Successful,
    Failed(EngineError),
}

/// [`SerStatus`] stripped of its payload, for storage in the `records`
/// namespace where only the kind of the pointed-to step matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerStatusKind {
    Accumulating,
    Processing,
    Successful,
    Failed,
}

impl SerStatus {
    pub fn kind(&self) -> SerStatusKind {
        match self {
            SerStatus::Accumulating => SerStatusKind::Accumulating,
            SerStatus::Processing => SerStatusKind::Processing,
            SerStatus::Successful => SerStatusKind::Successful,
            SerStatus::Failed(_) => SerStatusKind::Failed,
        }
    }
}

/// A snapshot of one record's (or one aggregated batch's) progress through
/// the chain.
///
/// `id` is `None` until the SER is durably published; a republication (the
/// aggregator re-emitting state for the same records under a new status)
/// always gets a fresh id rather than mutating the old one in place, so a
/// stale `id` read from a crashed run can never be confused with a live one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub id: Option<Uuid>,
    /// 1-based index of the step that produced this SER; 0 marks the
    /// synthetic bootstrap SER that seeds the chain's first step.
    pub step_index: usize,
    pub status: SerStatus,
    pub dependent_records: Vec<String>,
    pub acc_payload: Vec<Value>,
    pub output_payload: Option<Value>,
}

impl StepExecutionResult {
    /// The synthetic SER fed into the first aggregator step for a freshly
    /// pulled record. Never published on its own.
    pub fn bootstrap(record_id: String, payload: Value) -> Self {
        Self {
            id: None,
            step_index: 0,
            status: SerStatus::Successful,
            dependent_records: vec![record_id],
            acc_payload: Vec::new(),
            output_payload: Some(payload),
        }
    }

    pub fn accumulating(step_index: usize, dependent_records: Vec<String>, acc_payload: Vec<Value>) -> Self {
        Self { id: None, step_index, status: SerStatus::Accumulating, dependent_records, acc_payload, output_payload: None }
    }

    pub fn processing(step_index: usize, dependent_records: Vec<String>, acc_payload: Vec<Value>, output_payload: Value) -> Self {
        Self { id: None, step_index, status: SerStatus::Processing, dependent_records, acc_payload, output_payload: Some(output_payload) }
    }

    pub fn successful(step_index: usize, dependent_records: Vec<String>, output_payload: Value) -> Self {
        Self { id: None, step_index, status: SerStatus::Successful, dependent_records, acc_payload: Vec::new(), output_payload: Some(output_payload) }
    }

    pub fn failed(step_index: usize, dependent_records: Vec<String>, error: EngineError) -> Self {
        Self { id: None, step_index, status: SerStatus::Failed(error), dependent_records, acc_payload: Vec::new(), output_payload: None }
    }

    /// Runs the checkpoint protocol from spec §4.3 and returns the SER with
    /// its freshly assigned id.
    ///
    /// `chain_len` is the total number of steps; a `Successful` SER whose
    /// `step_index` equals it is the terminal state for its records, so
    /// their pointers are deleted rather than rewritten.
    pub async fn publish(mut self, persistence: &dyn KvNamespaces, chain_len: usize) -> Result<Self, EngineError> {
        let id = Uuid::now_v7();
        self.id = Some(id);
        let terminal = matches!(self.status, SerStatus::Successful) && self.step_index == chain_len;

        if matches!(self.status, SerStatus::Accumulating | SerStatus::Processing | SerStatus::Failed(_)) {
            persistence.put_step(id, &self).await?;
        }

        for rec_id in self.dependent_records.clone() {
            let prior = persistence.get_record(&rec_id).await?;
            if terminal {
                persistence.del_record(&rec_id).await?;
            } else {
                let pointer = super::RecordPointer { step_index: self.step_index, ser_id: id, status: self.status.kind() };
                persistence.put_record(&rec_id, &pointer).await?;
            }
            if let Some(prior) = prior {
                if prior.ser_id != id {
                    persistence.del_step(prior.ser_id).await?;
                }
            }
        }

        Ok(self)
    }
}
