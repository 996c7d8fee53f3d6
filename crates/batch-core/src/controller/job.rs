//! The batch job controller: pulls records, drives them through the
//! chain with bounded concurrency, and closes out the run (spec §4.4,
//! §4.5, §5).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::Notify;

use crate::errors::EngineError;
use crate::model::{SerStatus, StepExecutionResult};
use crate::persistence::KvNamespaces;
use crate::source::RecordSource;
use crate::status::{BatchStatus, ExecType, Phase};
use crate::step::StepChain;
use crate::summary::RunSummary;

/// A configured, runnable batch. Built once through
/// [`super::builder::BatchJobBuilder`]; `run` and `retry` each consume a
/// source and drive it to completion.
pub struct BatchJob<P: KvNamespaces> {
    name: String,
    concurrency_multiplier: usize,
    chain: Arc<StepChain>,
    persistence: Arc<P>,
}

impl<P: KvNamespaces + 'static> BatchJob<P> {
    pub(crate) fn new(name: String, concurrency_multiplier: usize, chain: StepChain, persistence: Arc<P>) -> Self {
        Self { name, concurrency_multiplier, chain: Arc::new(chain), persistence }
    }

    pub fn max_concurrent_records(&self) -> usize {
        self.chain.pipeline_fan_in() * self.concurrency_multiplier
    }

    /// Runs a fresh batch against `source` from an empty persistence
    /// context (spec §4.4.1).
    pub async fn run<S: RecordSource + 'static>(&self, source: S) -> Result<RunSummary, EngineError> {
        self.drive(source, ExecType::Run).await
    }

    /// Resumes a batch whose prior context crashed mid-run: recovers every
    /// residual record from `prior`, seeds the chain's buffers with it,
    /// force-drains what that seeding completes, then continues pulling
    /// fresh records from `source` (spec §4.4.3).
    pub async fn retry<S: RecordSource + 'static>(&self, prior: &dyn KvNamespaces, source: S) -> Result<RunSummary, EngineError> {
        self.recover(prior).await?;
        self.drive(source, ExecType::Retry).await
    }

    async fn recover(&self, prior: &dyn KvNamespaces) -> Result<(), EngineError> {
        let mut residual = prior.scan_records().await?;
        residual.sort_by_key(|(_, pointer)| pointer.step_index);

        let mut seen = std::collections::HashSet::new();
        for (_, pointer) in &residual {
            if !seen.insert(pointer.ser_id) {
                continue;
            }
            if let Some(snapshot) = prior.get_step(pointer.ser_id).await? {
                self.chain
                    .inject_recovered_state(snapshot.step_index, snapshot.dependent_records, snapshot.acc_payload);
            }
        }

        loop {
            if self.chain.records_in_chain() == 0 {
                break;
            }
            let results = self.chain.force_tail(self.persistence.as_ref()).await?;
            if results.is_empty() {
                // No step had a non-empty buffer this pass; nothing left to
                // force. (The record count alone can't signal this: a pass
                // that flushes an upstream step into a downstream one that
                // parks under-quota leaves `records_in_chain()` unchanged
                // while still making real progress, pushing that record one
                // step closer to the tail.)
                break;
            }
        }
        Ok(())
    }

    async fn drive<S: RecordSource + 'static>(&self, source: S, exec_type: ExecType) -> Result<RunSummary, EngineError> {
        let status = BatchStatus::new(self.name.clone(), exec_type, Utc::now());
        let ctx = Arc::new(JobCtx {
            chain: self.chain.clone(),
            persistence: self.persistence.clone(),
            source: Arc::new(source),
            status: SyncMutex::new(status),
            phase: SyncMutex::new(Phase::Injecting),
            active_workers: AtomicUsize::new(0),
            drain_lock: AsyncMutex::new(()),
            finished: std::sync::atomic::AtomicBool::new(false),
            done: Notify::new(),
        });

        let initial_status = ctx.status.lock().clone();
        initial_status.persist(ctx.persistence.as_ref()).await?;

        let worker_count = self.max_concurrent_records().max(1);
        ctx.active_workers.store(worker_count, Ordering::SeqCst);
        for _ in 0..worker_count {
            tokio::spawn(pump_loop(ctx.clone()));
        }

        ctx.done.notified().await;

        let final_phase = ctx.status.lock().phase;
        let summary = RunSummary::generate_default(ctx.persistence.as_ref(), final_phase).await?;
        if let Some(run_dir) = ctx.persistence.run_dir() {
            let resume_path = run_dir.join(crate::constants::RESUME_FILE_NAME);
            if let Err(e) = summary.write_to(&resume_path) {
                tracing::error!(target: "batch_core", error = %e, path = %resume_path.display(), "failed to write execution-resume.json");
            }
        }
        ctx.persistence.close().await?;
        Ok(summary)
    }
}

struct JobCtx<P: KvNamespaces> {
    chain: Arc<StepChain>,
    persistence: Arc<P>,
    source: Arc<dyn RecordSource>,
    status: SyncMutex<BatchStatus>,
    phase: SyncMutex<Phase>,
    active_workers: AtomicUsize,
    drain_lock: AsyncMutex<()>,
    finished: std::sync::atomic::AtomicBool,
    done: Notify,
}

impl<P: KvNamespaces> JobCtx<P> {
    fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    async fn record_loaded(&self, record_id: &str) -> Result<(), EngineError> {
        let snapshot = {
            let mut status = self.status.lock();
            status.loaded_records += 1;
            status.last_loaded_id = Some(record_id.to_string());
            status.clone()
        };
        snapshot.persist(self.persistence.as_ref()).await
    }

    async fn record_failed(&self, count: usize) -> Result<(), EngineError> {
        let snapshot = {
            let mut status = self.status.lock();
            status.failed_records += count as u64;
            status.clone()
        };
        snapshot.persist(self.persistence.as_ref()).await
    }

    async fn transition_to_draining(&self) -> Result<(), EngineError> {
        let already = {
            let mut phase = self.phase.lock();
            if *phase != Phase::Injecting {
                true
            } else {
                *phase = Phase::Draining;
                false
            }
        };
        if already {
            return Ok(());
        }
        let snapshot = {
            let mut status = self.status.lock();
            status.phase = Phase::Draining;
            status.clone()
        };
        snapshot.persist(self.persistence.as_ref()).await
    }

    /// Classifies a finished dispatch and returns how many fresh pump
    /// iterations the window needs to stay at capacity: `0` for a result
    /// that doesn't free up a slot (accumulating, or a failure whose
    /// concurrency loss is not replenished), otherwise the number of
    /// records the terminal SER finalized (spec §4.4.1).
    async fn account_and_refill_count(&self, ser: &StepExecutionResult) -> Result<usize, EngineError> {
        match &ser.status {
            SerStatus::Successful if ser.step_index == self.chain.len() => Ok(ser.dependent_records.len()),
            SerStatus::Failed(_) => {
                self.record_failed(ser.dependent_records.len().max(1)).await?;
                Ok(0)
            }
            _ => Ok(0),
        }
    }

    /// Spec §4.4.2: once draining and no pump task is still pulling or
    /// mid-dispatch, whatever remains in an aggregator's buffer will never
    /// be unparked by a future arrival — force a flush so a short final
    /// batch isn't stuck waiting forever. Run to a fixed point (a single
    /// `force_tail` pass can itself forward a payload into a step it
    /// already visited this pass; looping until a pass makes no further
    /// progress clears that residue, the same pattern `recover` uses for
    /// retry's injection drain).
    async fn maybe_progress_drain(&self) -> Result<(), EngineError> {
        if self.phase() != Phase::Draining {
            return Ok(());
        }
        if self.active_workers.load(Ordering::SeqCst) == 0 && self.chain.records_in_chain() > 0 {
            if let Ok(_guard) = self.drain_lock.try_lock() {
                loop {
                    if self.chain.records_in_chain() == 0 {
                        break;
                    }
                    let results = self.chain.force_tail(self.persistence.as_ref()).await?;
                    if results.is_empty() {
                        break;
                    }
                    for ser in &results {
                        self.account_and_refill_count(ser).await?;
                    }
                }
            }
        }
        self.maybe_finish().await
    }

    async fn maybe_finish(&self) -> Result<(), EngineError> {
        if self.phase() != Phase::Draining {
            return Ok(());
        }
        if self.active_workers.load(Ordering::SeqCst) != 0 || self.chain.records_in_chain() != 0 {
            return Ok(());
        }
        if self.finished.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let final_phase = {
            let mut status = self.status.lock();
            let failed = status.failed_records > 0;
            status.phase = if failed { Phase::FinishedErr } else { Phase::FinishedOk };
            status.end_time = Some(Utc::now());
            status.clone()
        };
        final_phase.persist(self.persistence.as_ref()).await?;
        self.done.notify_one();
        Ok(())
    }
}

fn pump_loop<P: KvNamespaces + 'static>(ctx: Arc<JobCtx<P>>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        loop {
            if ctx.phase() != Phase::Injecting {
                break;
            }
            match ctx.source.get_next().await {
                None => {
                    if let Err(e) = ctx.transition_to_draining().await {
                        tracing::error!(target: "batch_core", error = %e, "failed to persist drain transition");
                    }
                    break;
                }
                Some(record) => {
                    if let Err(e) = ctx.record_loaded(&record.id).await {
                        tracing::error!(target: "batch_core", error = %e, "failed to persist loaded record");
                    }
                    let bootstrap = StepExecutionResult::bootstrap(record.id, record.payload);
                    match ctx.chain.dispatch(ctx.persistence.as_ref(), bootstrap).await {
                        Ok(ser) => {
                            let refill = match ctx.account_and_refill_count(&ser).await {
                                Ok(n) => n,
                                Err(e) => {
                                    tracing::error!(target: "batch_core", error = %e, "failed to account result");
                                    0
                                }
                            };
                            if let Err(e) = ctx.maybe_progress_drain().await {
                                tracing::error!(target: "batch_core", error = %e, "failed to progress drain");
                            }
                            if refill == 0 {
                                break;
                            }
                            for _ in 1..refill {
                                ctx.active_workers.fetch_add(1, Ordering::SeqCst);
                                tokio::spawn(pump_loop(ctx.clone()));
                            }
                        }
                        Err(e) => {
                            tracing::error!(target: "batch_core", error = %e, "chain dispatch failed");
                            break;
                        }
                    }
                }
            }
        }
        let remaining = ctx.active_workers.fetch_sub(1, Ordering::SeqCst) - 1;
        // A worker that parks or fails its record is deliberately not
        // replenished (spec §4.4.1) — but if that was the *last* active
        // worker and injection hasn't finished, nobody is left to pull the
        // rest of the source. Keep exactly one puller alive in that case
        // rather than stalling with unread input and `phase` stuck at
        // `Injecting` forever.
        if remaining == 0 && ctx.phase() == Phase::Injecting {
            ctx.active_workers.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(pump_loop(ctx.clone()));
            return;
        }
        if let Err(e) = ctx.maybe_progress_drain().await {
            tracing::error!(target: "batch_core", error = %e, "failed to progress drain on worker exit");
        }
    })
}
