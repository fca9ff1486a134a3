//! Score Aggregator. Pure: no I/O, no mutation of outcomes.

use crate::model::{Outcome, OutcomeKey, ValidationStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageScore {
    pub language: String,
    /// Normalized to [0, 100].
    pub score: f64,
    pub points: u32,
    pub max_points: u32,
    pub cases: u32,
}

/// Why pairs ended up with the score they have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBreakdown {
    /// Valid verdicts from a judge call.
    pub judged: u32,
    pub generation_failed: u32,
    pub malformed: u32,
    pub grading_failed: u32,
}

impl FailureBreakdown {
    /// Pairs scored 0 by infrastructure rather than by the judge.
    pub fn infrastructure_zeros(&self) -> u32 {
        self.generation_failed + self.malformed + self.grading_failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: String,
    /// Normalized to [0, 100] over every case attempted by this model.
    pub overall: f64,
    pub points: u32,
    pub max_points: u32,
    pub cases: u32,
    /// Sorted by language. Languages with no cases for this model are absent.
    pub languages: Vec<LanguageScore>,
    pub breakdown: FailureBreakdown,
}

impl ModelScore {
    pub fn language(&self, language: &str) -> Option<&LanguageScore> {
        self.languages.iter().find(|l| l.language == language)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    /// Sorted by model id.
    pub models: Vec<ModelScore>,
}

impl AggregateScore {
    pub fn model(&self, model: &str) -> Option<&ModelScore> {
        self.models.iter().find(|m| m.model == model)
    }
}

#[derive(Default)]
struct Tally {
    points: u32,
    cases: u32,
}

impl Tally {
    fn add(&mut self, points: u32) {
        self.points += points;
        self.cases += 1;
    }

    fn max_points(&self) -> u32 {
        self.cases * 2
    }

    fn normalized(&self) -> f64 {
        if self.cases == 0 {
            0.0
        } else {
            100.0 * f64::from(self.points) / f64::from(self.max_points())
        }
    }
}

/// Total order used to pick one outcome per key.
fn precedence(o: &Outcome) -> (u64, bool, u8, u32, &str) {
    let status = match o.verdict.status() {
        ValidationStatus::Valid => 2,
        ValidationStatus::Malformed => 1,
        ValidationStatus::GradingFailed => 0,
    };
    (
        o.sequence,
        o.candidate.is_ok(),
        status,
        o.verdict.effective_points(),
        o.verdict.rationale(),
    )
}

/// Aggregates outcomes into per-(model, language) and per-model scores.
///
/// Non-valid verdicts count as 0. Duplicate keys resolve to the outcome with the
/// highest `sequence`. Equal sequences (sets merged from different stores) are
/// settled by the outcome's content, never by its position in `outcomes`.
pub fn aggregate(outcomes: &[Outcome]) -> AggregateScore {
    let mut latest: HashMap<&OutcomeKey, &Outcome> = HashMap::new();
    for o in outcomes {
        match latest.get(&o.key) {
            Some(prev) if precedence(prev) >= precedence(o) => {}
            _ => {
                latest.insert(&o.key, o);
            }
        }
    }

    struct ModelAcc {
        overall: Tally,
        languages: BTreeMap<String, Tally>,
        breakdown: FailureBreakdown,
    }

    let mut per_model: BTreeMap<&str, ModelAcc> = BTreeMap::new();
    for o in latest.into_values() {
        let acc = per_model
            .entry(o.key.model.as_str())
            .or_insert_with(|| ModelAcc {
                overall: Tally::default(),
                languages: BTreeMap::new(),
                breakdown: FailureBreakdown::default(),
            });
        let points = o.verdict.effective_points();
        acc.overall.add(points);
        acc.languages
            .entry(o.key.language.clone())
            .or_default()
            .add(points);

        if !o.candidate.is_ok() {
            acc.breakdown.generation_failed += 1;
        } else {
            match o.verdict.status() {
                ValidationStatus::Valid => acc.breakdown.judged += 1,
                ValidationStatus::Malformed => acc.breakdown.malformed += 1,
                ValidationStatus::GradingFailed => acc.breakdown.grading_failed += 1,
            }
        }
    }

    let models = per_model
        .into_iter()
        .map(|(model, acc)| ModelScore {
            model: model.to_string(),
            overall: acc.overall.normalized(),
            points: acc.overall.points,
            max_points: acc.overall.max_points(),
            cases: acc.overall.cases,
            languages: acc
                .languages
                .into_iter()
                .map(|(language, t)| LanguageScore {
                    language,
                    score: t.normalized(),
                    points: t.points,
                    max_points: t.max_points(),
                    cases: t.cases,
                })
                .collect(),
            breakdown: acc.breakdown,
        })
        .collect();

    AggregateScore { models }
}
