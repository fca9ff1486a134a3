//! Orchestration Engine: drives every (case, model) pair through generation
//! and grading on a bounded pool.

pub mod extract;
pub mod runner;

pub use runner::{CancelFlag, RunOptions, RunPolicy, Runner};
