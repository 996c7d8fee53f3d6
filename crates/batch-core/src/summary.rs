//! `execution-resume.json`: the human-facing artifact written at the end
//! of a run, describing what's left to clean up (spec §4.6).

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RESUME_DETAIL_LIMIT;
use crate::errors::EngineError;
use crate::model::SerStatusKind;
use crate::persistence::KvNamespaces;
use crate::status::Phase;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidualRecord {
    pub record_id: String,
    pub step_index: usize,
    pub status: SerStatusKind,
}

/// Summarizes a finished (or interrupted) run: the final phase, and what
/// is still sitting in the `records` namespace.
///
/// Anything still present there either failed outright or was mid-flight
/// when the process stopped; a future retry run picks it back up from
/// exactly the step it was parked at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub final_phase: Phase,
    pub incomplete_records: usize,
    pub incomplete_records_details: Vec<ResidualRecord>,
    pub truncated: bool,
}

impl RunSummary {
    pub async fn generate(
        persistence: &dyn KvNamespaces,
        final_phase: Phase,
        detail_limit: usize,
    ) -> Result<Self, EngineError> {
        let residual = persistence.scan_records().await?;
        let total = residual.len();
        let truncated = total > detail_limit;
        let details = residual
            .into_iter()
            .take(detail_limit)
            .map(|(record_id, pointer)| ResidualRecord {
                record_id,
                step_index: pointer.step_index,
                status: pointer.status,
            })
            .collect();

        Ok(Self {
            final_phase,
            incomplete_records: total,
            incomplete_records_details: details,
            truncated,
        })
    }

    pub async fn generate_default(persistence: &dyn KvNamespaces, final_phase: Phase) -> Result<Self, EngineError> {
        Self::generate(persistence, final_phase, DEFAULT_RESUME_DETAIL_LIMIT).await
    }

    pub fn write_to(&self, path: &Path) -> Result<(), EngineError> {
        let file = std::fs::File::create(path)
            .map_err(|e| EngineError::Persistence(format!("opening {}: {e}", path.display())))?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| EngineError::Persistence(format!("writing {}: {e}", path.display())))?;
        writer
            .flush()
            .map_err(|e| EngineError::Persistence(format!("flushing {}: {e}", path.display())))?;
        Ok(())
    }
}
