//! Integration tests against [`batch_core::InMemoryPersistence`], covering
//! the behaviors a caller actually depends on: straight-through execution,
//! aggregation, partial failure, and bounded concurrency.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use batch_core::{AggregatorStep, BatchJobBuilder, FnStep, InMemoryPersistence, Phase, Record, RecordSource};

struct VecSource {
    remaining: Mutex<std::collections::VecDeque<Record>>,
}

impl VecSource {
    fn new(records: Vec<Record>) -> Self {
        Self { remaining: Mutex::new(records.into_iter().collect()) }
    }

    fn numbered(count: usize) -> Self {
        Self::new((0..count).map(|i| Record::new(format!("rec-{i}"), json!(i))).collect())
    }
}

#[async_trait]
impl RecordSource for VecSource {
    async fn get_next(&self) -> Option<Record> {
        self.remaining.lock().pop_front()
    }
}

fn passthrough() -> Arc<FnStep<impl Fn(Vec<Value>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>> + Send + Sync>> {
    Arc::new(FnStep(|payloads: Vec<Value>| {
        Box::pin(async move { Ok(payloads.into_iter().next().unwrap_or(Value::Null)) })
            as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    }))
}

#[tokio::test]
async fn straight_through_single_step_finishes_ok() {
    let step = AggregatorStep::new("identity", 1, passthrough());
    let job = BatchJobBuilder::new(InMemoryPersistence::new())
        .name("straight-through")
        .concurrency_multiplier(2)
        .add_step(step)
        .build()
        .unwrap();

    let summary = job.run(VecSource::numbered(20)).await.unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedOk);
    assert_eq!(summary.incomplete_records, 0);
}

#[tokio::test]
async fn aggregation_batches_records_in_groups() {
    let calls = Arc::new(Mutex::new(Vec::<usize>::new()));
    let calls_for_step = calls.clone();
    let step_fn = FnStep(move |payloads: Vec<Value>| {
        let calls = calls_for_step.clone();
        Box::pin(async move {
            calls.lock().push(payloads.len());
            Ok(json!(payloads.len()))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });
    let step = AggregatorStep::new("group-of-4", 4, Arc::new(step_fn));

    let job = BatchJobBuilder::new(InMemoryPersistence::new())
        .name("aggregation")
        .concurrency_multiplier(1)
        .add_step(step)
        .build()
        .unwrap();

    let summary = job.run(VecSource::numbered(16)).await.unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedOk);
    let observed = calls.lock();
    assert_eq!(observed.iter().sum::<usize>(), 16);
    assert!(observed.iter().all(|&n| n <= 4 && n > 0));
}

#[tokio::test]
async fn drain_flushes_a_partial_tail_batch() {
    // 10 records through a group-of-4 aggregator: two full groups and one
    // partial group of 2 that only drain-on-exhaustion can flush.
    let step = AggregatorStep::new("group-of-4", 4, passthrough());
    let job = BatchJobBuilder::new(InMemoryPersistence::new())
        .name("drain-tail")
        .concurrency_multiplier(1)
        .add_step(step)
        .build()
        .unwrap();

    let summary = job.run(VecSource::numbered(10)).await.unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedOk);
    assert_eq!(summary.incomplete_records, 0);
}

#[tokio::test]
async fn user_step_failure_is_isolated_to_its_records() {
    let step_fn = FnStep(|payloads: Vec<Value>| {
        Box::pin(async move {
            let n = payloads.first().and_then(|v| v.as_u64()).unwrap_or(0);
            if n == 3 {
                Err("boom".to_string())
            } else {
                Ok(json!(n))
            }
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });
    let step = AggregatorStep::new("maybe-fails", 1, Arc::new(step_fn));

    let job = BatchJobBuilder::new(InMemoryPersistence::new())
        .name("partial-failure")
        .concurrency_multiplier(2)
        .add_step(step)
        .build()
        .unwrap();

    let summary = job.run(VecSource::numbered(8)).await.unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedErr);
    assert_eq!(summary.incomplete_records, 0);
}

#[tokio::test]
async fn multi_step_chain_forwards_between_steps() {
    let double = FnStep(|payloads: Vec<Value>| {
        Box::pin(async move {
            let n = payloads.first().and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!(n * 2))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });
    let add_one = FnStep(|payloads: Vec<Value>| {
        Box::pin(async move {
            let n = payloads.first().and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!(n + 1))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });

    let job = BatchJobBuilder::new(InMemoryPersistence::new())
        .name("two-step")
        .concurrency_multiplier(2)
        .add_step(AggregatorStep::new("double", 1, Arc::new(double)))
        .add_step(AggregatorStep::new("add-one", 2, Arc::new(add_one)))
        .build()
        .unwrap();

    let summary = job.run(VecSource::numbered(6)).await.unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedOk);
    assert_eq!(summary.incomplete_records, 0);
}

#[tokio::test]
async fn drain_forwards_an_under_quota_batch_into_a_downstream_parking_step() {
    // A single record through a [q=2, q=2] chain never reaches either
    // step's quota on its own: it parks in step one, and draining's forced
    // flush forwards it into step two, where it parks again rather than
    // finalizing. `records_in_chain()` is unchanged across that first
    // forced pass (one record leaves step one's buffer, the same record
    // lands in step two's), even though real progress was made — a second
    // forced pass is required to actually finalize it.
    let double = FnStep(|payloads: Vec<Value>| {
        Box::pin(async move {
            let total: i64 = payloads.iter().filter_map(Value::as_i64).sum();
            Ok(json!(total))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });
    let triple = FnStep(|payloads: Vec<Value>| {
        Box::pin(async move {
            let total: i64 = payloads.iter().filter_map(Value::as_i64).sum();
            Ok(json!(total))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });

    let job = BatchJobBuilder::new(InMemoryPersistence::new())
        .name("under-quota-forward")
        .concurrency_multiplier(1)
        .add_step(AggregatorStep::new("first", 2, Arc::new(double)))
        .add_step(AggregatorStep::new("second", 2, Arc::new(triple)))
        .build()
        .unwrap();

    let summary = tokio::time::timeout(std::time::Duration::from_secs(5), job.run(VecSource::numbered(1)))
        .await
        .expect("job hung instead of finalizing the forwarded under-quota batch")
        .unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedOk);
    assert_eq!(summary.incomplete_records, 0);
}

#[tokio::test]
async fn builder_rejects_empty_chain() {
    let err = BatchJobBuilder::<InMemoryPersistence>::new(InMemoryPersistence::new())
        .name("empty")
        .build()
        .unwrap_err();
    assert!(matches!(err, batch_core::EngineError::Configuration(_)));
}

#[tokio::test]
async fn builder_rejects_duplicate_step_names() {
    let err = BatchJobBuilder::new(InMemoryPersistence::new())
        .name("dupes")
        .add_step(AggregatorStep::new("same", 1, passthrough()))
        .add_step(AggregatorStep::new("same", 1, passthrough()))
        .build()
        .unwrap_err();
    assert!(matches!(err, batch_core::EngineError::Configuration(_)));
}
