//! Crash-recoverable [`KvNamespaces`] backend over an embedded sled
//! database, with a write-through [`DashMap`] cache in front of the
//! `records` and `steps` trees so a live run doesn't pay sled's read cost
//! on its own recent writes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use batch_core::{EngineError, ExecType, KvNamespaces, RecordPointer, StepExecutionResult};
use dashmap::DashMap;
use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, Transactional, TransactionError};
use uuid::Uuid;

use crate::error::StoreError;

pub struct SledPersistence {
    _db: sled::Db,
    status: sled::Tree,
    records: sled::Tree,
    steps: sled::Tree,
    records_cache: DashMap<String, RecordPointer>,
    steps_cache: DashMap<Uuid, StepExecutionResult>,
    run_dir: PathBuf,
}

impl SledPersistence {
    /// Creates a fresh run directory under `base_dir` named
    /// `{name}-[{RUN|RETRY}]-{iso8601}`, with `status`, `records`, and
    /// `steps` trees inside it (spec §4.1).
    pub fn create(base_dir: &Path, name: &str, exec_type: ExecType) -> Result<Self, StoreError> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let dir_name = format!("{name}-[{}]-{stamp}", exec_type.as_str());
        let run_dir = base_dir.join(dir_name);
        std::fs::create_dir_all(&run_dir)?;
        Self::open(run_dir)
    }

    /// Reopens a previous run's directory, for recovering a crashed run
    /// during `retry` (spec §4.4.3).
    pub fn open_existing(run_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(run_dir.as_ref().to_path_buf())
    }

    fn open(run_dir: PathBuf) -> Result<Self, StoreError> {
        let db = sled::open(&run_dir)?;
        let status = db.open_tree("status")?;
        let records = db.open_tree("records")?;
        let steps = db.open_tree("steps")?;
        Ok(Self {
            _db: db,
            status,
            records,
            steps,
            records_cache: DashMap::new(),
            steps_cache: DashMap::new(),
            run_dir,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn into_engine_err(e: StoreError) -> EngineError {
        EngineError::Persistence(e.to_string())
    }
}

#[async_trait]
impl KvNamespaces for SledPersistence {
    async fn put_status(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(&value).map_err(|e| EngineError::Persistence(e.to_string()))?;
        self.status.insert(key, bytes).map_err(|e| Self::into_engine_err(e.into()))?;
        Ok(())
    }

    async fn put_many_status(&self, values: Vec<(String, Value)>) -> Result<(), EngineError> {
        let result: Result<(), TransactionError<StoreError>> = self.status.transaction(|tx| {
            for (key, value) in &values {
                let bytes = serde_json::to_vec(value)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::Json(e.to_string())))?;
                tx.insert(key.as_bytes(), bytes)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(Self::into_engine_err(e)),
            Err(TransactionError::Storage(e)) => Err(Self::into_engine_err(e.into())),
        }
    }

    async fn get_status(&self, key: &str) -> Result<Option<Value>, EngineError> {
        let Some(bytes) = self.status.get(key).map_err(|e| Self::into_engine_err(e.into()))? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| EngineError::Persistence(e.to_string()))?;
        Ok(Some(value))
    }

    async fn put_record(&self, id: &str, value: &RecordPointer) -> Result<(), EngineError> {
        let bytes = bincode::serialize(value).map_err(StoreError::Codec).map_err(Self::into_engine_err)?;
        self.records.insert(id, bytes).map_err(|e| Self::into_engine_err(e.into()))?;
        self.records_cache.insert(id.to_string(), value.clone());
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<RecordPointer>, EngineError> {
        if let Some(cached) = self.records_cache.get(id) {
            return Ok(Some(cached.clone()));
        }
        let Some(bytes) = self.records.get(id).map_err(|e| Self::into_engine_err(e.into()))? else {
            return Ok(None);
        };
        let pointer: RecordPointer = bincode::deserialize(&bytes).map_err(StoreError::Codec).map_err(Self::into_engine_err)?;
        self.records_cache.insert(id.to_string(), pointer.clone());
        Ok(Some(pointer))
    }

    async fn del_record(&self, id: &str) -> Result<(), EngineError> {
        self.records.remove(id).map_err(|e| Self::into_engine_err(e.into()))?;
        self.records_cache.remove(id);
        Ok(())
    }

    async fn put_step(&self, id: Uuid, value: &StepExecutionResult) -> Result<(), EngineError> {
        let bytes = bincode::serialize(value).map_err(StoreError::Codec).map_err(Self::into_engine_err)?;
        self.steps.insert(id.as_bytes(), bytes).map_err(|e| Self::into_engine_err(e.into()))?;
        self.steps_cache.insert(id, value.clone());
        Ok(())
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<StepExecutionResult>, EngineError> {
        if let Some(cached) = self.steps_cache.get(&id) {
            return Ok(Some(cached.clone()));
        }
        let Some(bytes) = self.steps.get(id.as_bytes()).map_err(|e| Self::into_engine_err(e.into()))? else {
            return Ok(None);
        };
        let ser: StepExecutionResult = bincode::deserialize(&bytes).map_err(StoreError::Codec).map_err(Self::into_engine_err)?;
        self.steps_cache.insert(id, ser.clone());
        Ok(Some(ser))
    }

    async fn del_step(&self, id: Uuid) -> Result<(), EngineError> {
        self.steps.remove(id.as_bytes()).map_err(|e| Self::into_engine_err(e.into()))?;
        self.steps_cache.remove(&id);
        Ok(())
    }

    async fn scan_records(&self) -> Result<Vec<(String, RecordPointer)>, EngineError> {
        let mut out = Vec::new();
        for item in self.records.iter() {
            let (key, value) = item.map_err(|e| Self::into_engine_err(e.into()))?;
            let id = String::from_utf8_lossy(&key).into_owned();
            let pointer: RecordPointer = bincode::deserialize(&value).map_err(StoreError::Codec).map_err(Self::into_engine_err)?;
            out.push((id, pointer));
        }
        Ok(out)
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.status.flush_async().await.map_err(|e| Self::into_engine_err(e.into()))?;
        self.records.flush_async().await.map_err(|e| Self::into_engine_err(e.into()))?;
        self.steps.flush_async().await.map_err(|e| Self::into_engine_err(e.into()))?;
        Ok(())
    }

    fn run_dir(&self) -> Option<&Path> {
        Some(&self.run_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("my-batch-[RUN]-test");

        {
            let store = SledPersistence::open_existing(&run_dir).unwrap();
            let pointer = RecordPointer { step_index: 1, ser_id: Uuid::now_v7(), status: batch_core::SerStatusKind::Accumulating };
            store.put_record("r1", &pointer).await.unwrap();
            store.close().await.unwrap();
        }

        let reopened = SledPersistence::open_existing(&run_dir).unwrap();
        let found = reopened.get_record("r1").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn put_many_status_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("atomic-[RUN]-test");
        let store = SledPersistence::open_existing(&run_dir).unwrap();

        store
            .put_many_status(vec![("phase".into(), json!("Injecting")), ("loaded_records".into(), json!(0))])
            .await
            .unwrap();

        assert_eq!(store.get_status("phase").await.unwrap(), Some(json!("Injecting")));
        assert_eq!(store.get_status("loaded_records").await.unwrap(), Some(json!(0)));
    }
}
