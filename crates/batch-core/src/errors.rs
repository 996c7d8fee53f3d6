//! Engine error taxonomy (see spec §7).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the engine core.
///
/// `BadInput` and `UserStepError` are local to a single record's lineage:
/// the chain continues for every other record in flight. `Persistence`
/// marks the affected record as failed but does not abort the run.
/// `Configuration` is fatal and only ever raised at `build()` time.
///
/// Serializable so a `Failed` SER's error survives a checkpoint round trip.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum EngineError {
    #[error("aggregator received a malformed step result: {0}")]
    BadInput(String),

    #[error("user step function failed: {0}")]
    UserStep(String),

    #[error("persistence operation failed: {0}")]
    Persistence(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}
