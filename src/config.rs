//! Demo configuration: a thin wrapper over a handful of environment
//! variables, loaded once at startup.

use std::env;
use std::path::PathBuf;

pub struct DemoConfig {
    pub job_name: String,
    pub concurrency_multiplier: usize,
    pub run_dir: PathBuf,
    pub record_count: usize,
}

impl DemoConfig {
    pub fn from_env() -> Self {
        let job_name = env::var("BATCH_JOB_NAME").unwrap_or_else(|_| "demo-batch".to_string());
        let concurrency_multiplier = env::var("BATCH_CONCURRENCY_MULTIPLIER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);
        let run_dir = env::var("BATCH_RUN_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./runs"));
        let record_count = env::var("BATCH_RECORD_COUNT").ok().and_then(|v| v.parse().ok()).unwrap_or(25);

        Self { job_name, concurrency_multiplier, run_dir, record_count }
    }
}
