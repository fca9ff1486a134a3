//! summary.json: machine-readable scores for a run.

use crate::aggregate::{AggregateScore, ModelScore};
use crate::report::ReportRenderer;
use crate::store::OutcomeSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current schema version for summary.json
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub schema_version: u32,
    pub run_id: String,
    pub judge_model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Partial run: some pairs were never scheduled.
    pub cancelled: bool,
    pub pairs: usize,
    pub models: Vec<ModelScore>,
}

impl Summary {
    pub fn new(aggregate: &AggregateScore, outcomes: &OutcomeSet) -> Self {
        let duration_ms = (outcomes.finished_at - outcomes.started_at)
            .num_milliseconds()
            .max(0) as u64;
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: outcomes.run_id.clone(),
            judge_model: outcomes.judge_model.clone(),
            started_at: outcomes.started_at,
            finished_at: outcomes.finished_at,
            duration_ms,
            cancelled: outcomes.cancelled,
            pairs: outcomes.outcomes.len(),
            models: aggregate.models.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryReport;

impl ReportRenderer for SummaryReport {
    fn render(&self, aggregate: &AggregateScore, outcomes: &OutcomeSet) -> String {
        let summary = Summary::new(aggregate, outcomes);
        serde_json::to_string_pretty(&summary).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

pub fn write_summary(summary: &Summary, out: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(out, json)?;
    Ok(())
}
