//! Core data types shared across the engine (spec §3).

mod record;
mod ser;

pub use record::Record;
pub use ser::{SerStatus, SerStatusKind, StepExecutionResult};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `records` namespace's value: a pointer from a record id to its most
/// recently published SER, so a crash-recovering run can find where each
/// record's lineage left off without replaying history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPointer {
    pub step_index: usize,
    pub ser_id: Uuid,
    pub status: SerStatusKind,
}
