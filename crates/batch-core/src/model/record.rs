//! The user-supplied record type consumed from the source (spec §3, §6).

use serde_json::Value;

/// A single unit of work pulled from the user's [`crate::source::RecordSource`].
///
/// The engine never interprets `payload`; only `id` participates in
/// bookkeeping (persistence keys, dependent-record lists, counters).
#[derive(Debug, Clone)]
pub struct Record {
    pub id: String,
    pub payload: Value,
}

impl Record {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self { id: id.into(), payload }
    }
}
