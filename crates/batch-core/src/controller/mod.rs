//! The batch job controller (spec §4.4–§4.6, §5).

mod builder;
mod job;

pub use builder::BatchJobBuilder;
pub use job::BatchJob;
