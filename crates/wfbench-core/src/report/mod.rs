//! Report renderers. Each consumes a finished (AggregateScore, OutcomeSet) snapshot.

pub mod console;
pub mod progress;
pub mod summary;

use crate::aggregate::AggregateScore;
use crate::store::OutcomeSet;

pub trait ReportRenderer {
    fn render(&self, aggregate: &AggregateScore, outcomes: &OutcomeSet) -> String;
}

/// Full outcome set as pretty JSON, same shape as `outcomes.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReport;

impl ReportRenderer for JsonReport {
    fn render(&self, _aggregate: &AggregateScore, outcomes: &OutcomeSet) -> String {
        serde_json::to_string_pretty(outcomes).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}
