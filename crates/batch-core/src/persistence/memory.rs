//! In-process reference implementation of [`KvNamespaces`], used by the
//! core crate's own tests and by embedders who don't need crash recovery.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use super::KvNamespaces;
use crate::errors::EngineError;
use crate::model::{RecordPointer, StepExecutionResult};

#[derive(Default)]
pub struct InMemoryPersistence {
    status: DashMap<String, Value>,
    records: DashMap<String, RecordPointer>,
    steps: DashMap<Uuid, StepExecutionResult>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvNamespaces for InMemoryPersistence {
    async fn put_status(&self, key: &str, value: Value) -> Result<(), EngineError> {
        self.status.insert(key.to_string(), value);
        Ok(())
    }

    async fn put_many_status(&self, values: Vec<(String, Value)>) -> Result<(), EngineError> {
        for (key, value) in values {
            self.status.insert(key, value);
        }
        Ok(())
    }

    async fn get_status(&self, key: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.status.get(key).map(|v| v.clone()))
    }

    async fn put_record(&self, id: &str, value: &RecordPointer) -> Result<(), EngineError> {
        self.records.insert(id.to_string(), value.clone());
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<RecordPointer>, EngineError> {
        Ok(self.records.get(id).map(|v| v.clone()))
    }

    async fn del_record(&self, id: &str) -> Result<(), EngineError> {
        self.records.remove(id);
        Ok(())
    }

    async fn put_step(&self, id: Uuid, value: &StepExecutionResult) -> Result<(), EngineError> {
        self.steps.insert(id, value.clone());
        Ok(())
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<StepExecutionResult>, EngineError> {
        Ok(self.steps.get(&id).map(|v| v.clone()))
    }

    async fn del_step(&self, id: Uuid) -> Result<(), EngineError> {
        self.steps.remove(&id);
        Ok(())
    }

    async fn scan_records(&self) -> Result<Vec<(String, RecordPointer)>, EngineError> {
        Ok(self.records.iter().map(|kv| (kv.key().clone(), kv.value().clone())).collect())
    }

    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}
