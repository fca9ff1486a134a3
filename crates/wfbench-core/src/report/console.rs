use crate::aggregate::AggregateScore;
use crate::model::{Outcome, ValidationStatus};
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::ReportRenderer;
use crate::store::OutcomeSet;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Format a single progress line for display.
#[must_use]
pub fn format_progress_line(done: usize, total: usize) -> String {
    format!("Graded pair {}/{}...", done, total)
}

pub fn emit_progress_line(line: &str) {
    eprintln!("{}", line);
}

/// Minimum interval between progress updates.
const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

/// For large runs, emit at most every this many pairs (10% steps).
pub(crate) fn progress_step(total: usize) -> usize {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

/// Throttled sink printing `Graded pair N/M...` to stderr. Always emits the final
/// update; returns `None` for runs of at most one pair.
pub fn default_progress_sink(total: usize) -> Option<ProgressSink> {
    if total <= 1 {
        return None;
    }
    let step = progress_step(total);
    let last_emit: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    Some(Arc::new(move |ev: ProgressEvent| {
        if ev.total == 0 {
            return;
        }
        let now = Instant::now();
        let should_emit = match last_emit.lock() {
            Ok(mut g) => {
                let emit_final = ev.done == ev.total;
                let emit_step = ev.done % step == 0 || ev.done == 1;
                let interval_ok = (*g)
                    .map(|t| {
                        now.saturating_duration_since(t)
                            >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
                    })
                    .unwrap_or(true);
                let ok = emit_final || (emit_step && interval_ok);
                if ok {
                    *g = Some(now);
                }
                ok
            }
            Err(_) => ev.done == ev.total,
        };
        if should_emit {
            emit_progress_line(&format_progress_line(ev.done, ev.total));
        }
    }))
}

/// Human-readable score table plus a list of infrastructure failures.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReport {
    /// List every pair that scored through infrastructure failure.
    pub show_failures: bool,
}

impl ReportRenderer for ConsoleReport {
    fn render(&self, aggregate: &AggregateScore, outcomes: &OutcomeSet) -> String {
        let mut out = String::new();
        let languages: BTreeSet<&str> = aggregate
            .models
            .iter()
            .flat_map(|m| m.languages.iter().map(|l| l.language.as_str()))
            .collect();

        let _ = writeln!(
            out,
            "Run {} (judge: {}){}",
            outcomes.run_id,
            outcomes.judge_model,
            if outcomes.cancelled { " [CANCELLED, partial]" } else { "" }
        );
        if aggregate.models.is_empty() {
            let _ = writeln!(out, "No outcomes.");
            return out;
        }

        let model_w = aggregate
            .models
            .iter()
            .map(|m| m.model.len())
            .max()
            .unwrap_or(5)
            .max(5);
        let lang_ws: Vec<usize> = languages.iter().map(|l| l.len().max(6)).collect();

        let _ = write!(out, "\n{:<w$}", "model", w = model_w);
        for (lang, w) in languages.iter().zip(&lang_ws) {
            let _ = write!(out, "  {:>w$}", lang, w = *w);
        }
        let _ = writeln!(
            out,
            "  {:>7}  {:>6}  {:>8}  {:>9}  {:>7}",
            "overall", "judged", "gen_fail", "malformed", "grading"
        );

        for m in &aggregate.models {
            let _ = write!(out, "{:<w$}", m.model, w = model_w);
            for (lang, w) in languages.iter().zip(&lang_ws) {
                let cell = m
                    .language(lang)
                    .map(|l| format!("{:.1}", l.score))
                    .unwrap_or_else(|| "-".into());
                let _ = write!(out, "  {:>w$}", cell, w = *w);
            }
            let b = m.breakdown;
            let _ = writeln!(
                out,
                "  {:>7.1}  {:>6}  {:>8}  {:>9}  {:>7}",
                m.overall, b.judged, b.generation_failed, b.malformed, b.grading_failed
            );
        }

        let infra: Vec<&Outcome> = outcomes
            .outcomes
            .iter()
            .filter(|o| o.is_infrastructure_failure())
            .collect();
        if !infra.is_empty() {
            let _ = writeln!(
                out,
                "\n{} pair(s) scored 0 through infrastructure failure, not the judge.",
                infra.len()
            );
            if self.show_failures {
                for o in infra {
                    let _ = writeln!(out, "  {}  {}", o.key, failure_reason(o));
                }
            }
        }
        out
    }
}

fn failure_reason(o: &Outcome) -> String {
    if let Some(f) = &o.candidate.failure {
        return format!("generation failed ({}): {}", f.kind, f.message);
    }
    match o.verdict.status() {
        ValidationStatus::Malformed => format!("malformed verdict: {}", o.verdict.rationale()),
        ValidationStatus::GradingFailed => format!("grading failed: {}", o.verdict.rationale()),
        ValidationStatus::Valid => "ok".to_string(),
    }
}
