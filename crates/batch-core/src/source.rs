//! The record source the controller pulls from (spec §6).

use async_trait::async_trait;

use crate::model::Record;

/// Supplies records to a running batch. `get_next` returning `None` is the
/// only signal the controller has that injection is complete; it must not
/// be transient (once a source starts returning `None` it must keep doing
/// so for the rest of the run).
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn get_next(&self) -> Option<Record>;
}
