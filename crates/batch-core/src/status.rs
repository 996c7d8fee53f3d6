//! Batch job status: the durable, atomically-updated summary of a run in
//! progress (spec §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::EngineError;
use crate::persistence::KvNamespaces;

/// Whether this persistence context belongs to a fresh run or a retry of a
/// prior one. Folded into the run directory name (see `batch-persistence`)
/// and into `status.exec_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecType {
    Run,
    Retry,
}

impl ExecType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecType::Run => "RUN",
            ExecType::Retry => "RETRY",
        }
    }
}

/// Where a batch currently stands. `Injecting` and `Draining` are the two
/// in-progress phases (spec §4.4.1, §4.4.2); the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    NotStarted,
    Injecting,
    Draining,
    FinishedOk,
    FinishedErr,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::FinishedOk | Phase::FinishedErr)
    }
}

/// The full contents of the `status` namespace, kept in memory by the
/// controller and persisted through [`KvNamespaces::put_many_status`] so a
/// reader never observes a half-updated set of fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub name: String,
    pub exec_type: ExecType,
    pub phase: Phase,
    pub loaded_records: u64,
    pub failed_records: u64,
    pub last_loaded_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl BatchStatus {
    pub fn new(name: impl Into<String>, exec_type: ExecType, start_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            exec_type,
            phase: Phase::NotStarted,
            loaded_records: 0,
            failed_records: 0,
            last_loaded_id: None,
            start_time,
            end_time: None,
        }
    }

    pub async fn persist(&self, persistence: &dyn KvNamespaces) -> Result<(), EngineError> {
        let values = vec![
            ("name".to_string(), json!(self.name)),
            ("exec_type".to_string(), json!(self.exec_type)),
            ("phase".to_string(), json!(self.phase)),
            ("loaded_records".to_string(), json!(self.loaded_records)),
            ("failed_records".to_string(), json!(self.failed_records)),
            ("last_loaded_id".to_string(), json!(self.last_loaded_id)),
            ("start_time".to_string(), json!(self.start_time)),
            ("end_time".to_string(), json!(self.end_time)),
        ];
        persistence.put_many_status(values).await
    }
}
