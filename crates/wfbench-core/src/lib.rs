//! Execution and scoring pipeline for the workflow-SDK rewrite benchmark.
//!
//! Candidate models rewrite ordinary code to use a workflow-orchestration SDK;
//! a judge model scores each rewrite against a golden solution.
//!
//! - [`corpus`]: discovers test cases
//! - [`invoker`]: calls a named model with retry, backoff and timeouts
//! - [`judge`]: grades a candidate through the judge model
//! - [`engine`]: runs every (case, model) pair on a bounded pool
//! - [`aggregate`]: turns outcomes into normalized scores
//! - [`report`]: console table and summary.json
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wfbench_core::corpus::{CaseRepository, FsCaseRepository};
//! use wfbench_core::engine::{RunOptions, RunPolicy, Runner};
//! use wfbench_core::prompts::TemplatePrompts;
//! use wfbench_core::{aggregate::aggregate, config::BenchConfig, providers};
//!
//! # async fn example(creds: &dyn wfbench_core::config::CredentialResolver) -> anyhow::Result<()> {
//! let config = BenchConfig::load("wfbench.yaml".as_ref())?;
//! let cases = FsCaseRepository::open("cases")?.list_cases()?;
//! let invoker = providers::build_invoker(&config, creds)?;
//! let runner = Runner::new(
//!     Arc::new(invoker),
//!     Arc::new(TemplatePrompts::builtin()),
//!     config.judge_model()?,
//!     RunPolicy { concurrency: config.concurrency },
//! );
//! let set = runner.run(&cases, &config.candidates, RunOptions::default()).await;
//! let scores = aggregate(&set.outcomes);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod errors;
pub mod invoker;
pub mod judge;
pub mod model;
pub mod prompts;
pub mod providers;
pub mod report;
pub mod store;

pub use aggregate::{aggregate, AggregateScore};
pub use engine::{RunOptions, RunPolicy, Runner};
pub use errors::{ConfigError, InvokeError, RepositoryError, RunError};
pub use model::{Outcome, TestCase, Verdict};
pub use store::OutcomeSet;
