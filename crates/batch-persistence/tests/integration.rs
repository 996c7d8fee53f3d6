//! A representative subset of the core scenarios (spec §8), run against a
//! real `sled` database in a `tempfile::tempdir()` instead of the fast
//! in-memory backend `batch-core`'s own tests use.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use batch_core::{AggregatorStep, BatchJobBuilder, ExecType, FnStep, Phase, Record, RecordSource};
use batch_persistence::SledPersistence;

struct VecSource {
    remaining: Mutex<std::collections::VecDeque<Record>>,
}

impl VecSource {
    fn numbered(count: usize) -> Self {
        Self { remaining: Mutex::new((0..count).map(|i| Record::new(format!("rec-{i}"), json!(i))).collect()) }
    }
}

#[async_trait]
impl RecordSource for VecSource {
    async fn get_next(&self) -> Option<Record> {
        self.remaining.lock().pop_front()
    }
}

fn sum_fn() -> Arc<FnStep<impl Fn(Vec<Value>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>> + Send + Sync>> {
    Arc::new(FnStep(|payloads: Vec<Value>| {
        Box::pin(async move {
            let total: i64 = payloads.iter().filter_map(Value::as_i64).sum();
            Ok(json!(total))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    }))
}

#[tokio::test]
async fn straight_through_against_a_real_sled_db_leaves_no_residual_rows() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = SledPersistence::create(dir.path(), "sled-straight-through", ExecType::Run).unwrap();

    let job = BatchJobBuilder::new(persistence)
        .name("sled-straight-through")
        .concurrency_multiplier(2)
        .add_step(AggregatorStep::new("sum-pairs", 2, sum_fn()))
        .build()
        .unwrap();

    let summary = job.run(VecSource::numbered(10)).await.unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedOk);
    assert_eq!(summary.incomplete_records, 0);
}

#[tokio::test]
async fn drain_under_quota_flushes_the_remainder_against_sled() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = SledPersistence::create(dir.path(), "sled-drain", ExecType::Run).unwrap();

    let job = BatchJobBuilder::new(persistence)
        .name("sled-drain")
        .concurrency_multiplier(1)
        .add_step(AggregatorStep::new("group-of-5", 5, sum_fn()))
        .build()
        .unwrap();

    // 3 records into a quantity-5 aggregator: only a forced drain flushes them.
    let summary = job.run(VecSource::numbered(3)).await.unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedOk);
    assert_eq!(summary.incomplete_records, 0);
}

#[tokio::test]
async fn a_crashed_run_reopens_with_its_residual_records_intact() {
    let dir = tempfile::tempdir().unwrap();
    let run_dir = dir.path().join("crash-sim-[RUN]-test");

    {
        let persistence = SledPersistence::open_existing(&run_dir).unwrap();
        let pointer = batch_core::RecordPointer {
            step_index: 1,
            ser_id: uuid::Uuid::now_v7(),
            status: batch_core::SerStatusKind::Accumulating,
        };
        batch_core::KvNamespaces::put_record(&persistence, "rec-0", &pointer).await.unwrap();
        persistence.close().await.unwrap();
    }

    let reopened = SledPersistence::open_existing(&run_dir).unwrap();
    let residual = batch_core::KvNamespaces::scan_records(&reopened).await.unwrap();
    assert_eq!(residual.len(), 1);
    assert_eq!(residual[0].0, "rec-0");
}
