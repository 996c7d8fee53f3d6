//! `batch-core`: the aggregator-chain batch processing engine.
//!
//! Records are pulled one at a time from a [`source::RecordSource`],
//! bootstrapped into a [`model::StepExecutionResult`], and pumped through
//! an ordered [`step::StepChain`] of [`step::AggregatorStep`]s under
//! bounded concurrency. Every state transition is checkpointed through a
//! [`persistence::KvNamespaces`] backend, so a process that crashes
//! mid-run can be resumed with [`controller::BatchJob::retry`] instead of
//! starting over.
//!
//! This crate only knows the in-memory reference persistence backend
//! ([`persistence::InMemoryPersistence`]); a crash-recoverable embedded
//! store lives in the sibling `batch-persistence` crate.

pub mod constants;
pub mod controller;
pub mod errors;
pub mod model;
pub mod persistence;
pub mod source;
pub mod status;
pub mod step;
pub mod summary;

pub use controller::{BatchJob, BatchJobBuilder};
pub use errors::EngineError;
pub use model::{Record, RecordPointer, SerStatus, SerStatusKind, StepExecutionResult};
pub use persistence::{InMemoryPersistence, KvNamespaces};
pub use source::RecordSource;
pub use status::{BatchStatus, ExecType, Phase};
pub use step::{AggregatorStep, FnStep, StepChain, StepFn};
pub use summary::RunSummary;
