//! Demo binary: wires a two-step chain over a generated record source and
//! runs it to completion against a real sled-backed persistence context.

mod config;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use batch_core::{AggregatorStep, BatchJobBuilder, ExecType, FnStep, Record, RecordSource};
use batch_persistence::SledPersistence;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use config::DemoConfig;

/// Hands out `count` records with a monotonically increasing payload, then
/// signals completion.
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("batch_core=info,batch_persistence=info")))
        .init();

    let config = DemoConfig::from_env();
    std::fs::create_dir_all(&config.run_dir)?;

    let persistence = SledPersistence::create(&config.run_dir, &config.job_name, ExecType::Run)?;
    let actual_run_dir = persistence.run_dir().to_path_buf();
    tracing::info!(target: "batch_core", run_dir = %actual_run_dir.display(), "opened persistence context");

    let square = FnStep(|payloads: Vec<Value>| {
        Box::pin(async move {
            let n = payloads.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(n * n))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });

    let sum_of_four = FnStep(|payloads: Vec<Value>| {
        Box::pin(async move {
            let total: i64 = payloads.iter().filter_map(Value::as_i64).sum();
            Ok(json!(total))
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send>>
    });

    let job = BatchJobBuilder::new(persistence)
        .name(config.job_name.clone())
        .concurrency_multiplier(config.concurrency_multiplier)
        .add_step(AggregatorStep::new("square", 1, std::sync::Arc::new(square)))
        .add_step(AggregatorStep::new("sum-of-four", 4, std::sync::Arc::new(sum_of_four)))
        .build()?;

    let summary = job.run(CountingSource::new(config.record_count)).await?;

    let resume_path = actual_run_dir.join("execution-resume.json");

    println!("batch '{}' finished: {:?}", config.job_name, summary.final_phase);
    println!("incomplete records: {}", summary.incomplete_records);
    println!("resume details written to {}", resume_path.display());

    Ok(())
}
