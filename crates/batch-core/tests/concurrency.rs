//! Bounded-concurrency scenario (spec §8, scenario 6): with
//! `pipeline_fan_in = q` and `concurrency_multiplier = m`, no more than
//! `q * m` records are ever mid-execution at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use batch_core::{AggregatorStep, BatchJobBuilder, FnStep, InMemoryPersistence, Phase, Record, RecordSource};

struct CountingSource {
    next: AtomicUsize,
    count: usize,
}

impl CountingSource {
    fn new(count: usize) -> Self {
        Self { next: AtomicUsize::new(0), count }
    }
}

#[async_trait]
impl RecordSource for CountingSource {
    async fn get_next(&self) -> Option<Record> {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        if i >= self.count {
            return None;
        }
        Some(Record::new(format!("rec-{i}"), json!(i)))
    }
}

#[tokio::test]
async fn in_flight_count_never_exceeds_pipeline_fan_in_times_multiplier() {
    let current = Arc::new(AtomicUsize::new(0));
    let observed_max = Arc::new(AtomicUsize::new(0));

    let current_for_step = current.clone();
    let observed_max_for_step = observed_max.clone();
    let slow_identity = FnStep(move |payloads: Vec<Value>| {
        let current = current_for_step.clone();
        let observed_max = observed_max_for_step.clone();
        Box::pin(async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            observed_max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(payloads.into_iter().next().unwrap_or(Value::Null))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });

    let concurrency_multiplier = 4;
    let job = BatchJobBuilder::new(InMemoryPersistence::new())
        .name("bounded")
        .concurrency_multiplier(concurrency_multiplier)
        .add_step(AggregatorStep::new("slow-identity", 2, Arc::new(slow_identity)))
        .build()
        .unwrap();

    let max_concurrent = job.max_concurrent_records();
    assert_eq!(max_concurrent, 2 * concurrency_multiplier);

    let summary = job.run(CountingSource::new(1000)).await.unwrap();

    assert_eq!(summary.final_phase, Phase::FinishedOk);
    assert_eq!(summary.incomplete_records, 0);
    assert!(
        observed_max.load(Ordering::SeqCst) <= max_concurrent,
        "observed {} concurrent user-step calls, expected at most {}",
        observed_max.load(Ordering::SeqCst),
        max_concurrent,
    );
}
