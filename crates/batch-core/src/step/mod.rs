//! The aggregator-chain machinery (spec §4.2, §4.4).

mod aggregator;
mod chain;
mod user_fn;

pub use aggregator::{AggregatorStep, StepOutcome};
pub use chain::StepChain;
pub use user_fn::{FnStep, StepFn};
