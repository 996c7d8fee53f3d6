//! The persistence-context abstraction (spec §4.1): three logical
//! namespaces (`status`, `records`, `steps`) behind a trait, so the engine
//! core stays storage-agnostic and a crate downstream can swap in a real
//! embedded store without touching the controller.

mod memory;

pub use memory::InMemoryPersistence;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::model::{RecordPointer, StepExecutionResult};

/// A crash-recoverable key/value backend split into the three namespaces
/// the checkpoint protocol needs.
///
/// Every method is fallible with [`EngineError::Persistence`]; a backend
/// crate maps its own storage errors into that variant at the boundary so
/// `batch-core` never depends on a specific store's error type.
#[async_trait]
pub trait KvNamespaces: Send + Sync {
    async fn put_status(&self, key: &str, value: Value) -> Result<(), EngineError>;

    /// Writes several status keys as one atomic unit (spec §4.1: batch job
    /// status fields must never be observed half-updated).
    async fn put_many_status(&self, values: Vec<(String, Value)>) -> Result<(), EngineError>;

    async fn get_status(&self, key: &str) -> Result<Option<Value>, EngineError>;

    async fn put_record(&self, id: &str, value: &RecordPointer) -> Result<(), EngineError>;

    async fn get_record(&self, id: &str) -> Result<Option<RecordPointer>, EngineError>;

    async fn del_record(&self, id: &str) -> Result<(), EngineError>;

    async fn put_step(&self, id: Uuid, value: &StepExecutionResult) -> Result<(), EngineError>;

    async fn get_step(&self, id: Uuid) -> Result<Option<StepExecutionResult>, EngineError>;

    async fn del_step(&self, id: Uuid) -> Result<(), EngineError>;

    /// Every row currently in the `records` namespace, for the retry
    /// algorithm's recovery scan (spec §4.4.3).
    async fn scan_records(&self) -> Result<Vec<(String, RecordPointer)>, EngineError>;

    /// Flushes and releases the backend. Called once at the end of a run,
    /// and from the SIGINT/SIGTERM handler on an interrupted one.
    async fn close(&self) -> Result<(), EngineError>;

    /// The on-disk directory this context is rooted at, if it has one.
    /// `drive()` uses this to write `execution-resume.json` (spec §4.6)
    /// next to the run's other state; a backend with nowhere durable to
    /// put it (e.g. [`InMemoryPersistence`]) just returns `None`.
    fn run_dir(&self) -> Option<&std::path::Path> {
        None
    }
}

/// Lets an embedder (or a test that needs to retain a handle to a `prior`
/// run's context after handing a job its own) share a backend behind an
/// `Arc` instead of giving the builder sole ownership of it.
#[async_trait]
impl<T: KvNamespaces + ?Sized> KvNamespaces for std::sync::Arc<T> {
    async fn put_status(&self, key: &str, value: Value) -> Result<(), EngineError> {
        (**self).put_status(key, value).await
    }

    async fn put_many_status(&self, values: Vec<(String, Value)>) -> Result<(), EngineError> {
        (**self).put_many_status(values).await
    }

    async fn get_status(&self, key: &str) -> Result<Option<Value>, EngineError> {
        (**self).get_status(key).await
    }

    async fn put_record(&self, id: &str, value: &RecordPointer) -> Result<(), EngineError> {
        (**self).put_record(id, value).await
    }

    async fn get_record(&self, id: &str) -> Result<Option<RecordPointer>, EngineError> {
        (**self).get_record(id).await
    }

    async fn del_record(&self, id: &str) -> Result<(), EngineError> {
        (**self).del_record(id).await
    }

    async fn put_step(&self, id: Uuid, value: &StepExecutionResult) -> Result<(), EngineError> {
        (**self).put_step(id, value).await
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<StepExecutionResult>, EngineError> {
        (**self).get_step(id).await
    }

    async fn del_step(&self, id: Uuid) -> Result<(), EngineError> {
        (**self).del_step(id).await
    }

    async fn scan_records(&self) -> Result<Vec<(String, RecordPointer)>, EngineError> {
        (**self).scan_records().await
    }

    async fn close(&self) -> Result<(), EngineError> {
        (**self).close().await
    }

    fn run_dir(&self) -> Option<&std::path::Path> {
        (**self).run_dir()
    }
}
