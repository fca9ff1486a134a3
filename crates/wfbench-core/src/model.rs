use crate::errors::{FailureKind, InvokeError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a case asks the candidate to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Rewrite the provided before-code.
    #[default]
    Refactor,
    /// Write the code from the task description alone.
    Generate,
}

/// Identity of a case: (language, case-id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseKey {
    pub language: String,
    pub case_id: String,
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language, self.case_id)
    }
}

/// One before/golden/description triple.
///
/// `before` is `None` exactly when `kind` is [`TaskKind::Generate`]; the
/// corpus loader enforces this and refuses empty before-code for refactors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub language: String,
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    pub golden: String,
}

impl TestCase {
    pub fn refactor(
        language: impl Into<String>,
        id: impl Into<String>,
        description: impl Into<String>,
        before: impl Into<String>,
        golden: impl Into<String>,
    ) -> Self {
        Self {
            language: language.into(),
            id: id.into(),
            description: description.into(),
            kind: TaskKind::Refactor,
            before: Some(before.into()),
            golden: golden.into(),
        }
    }

    pub fn generate(
        language: impl Into<String>,
        id: impl Into<String>,
        description: impl Into<String>,
        golden: impl Into<String>,
    ) -> Self {
        Self {
            language: language.into(),
            id: id.into(),
            description: description.into(),
            kind: TaskKind::Generate,
            before: None,
            golden: golden.into(),
        }
    }

    pub fn key(&self) -> CaseKey {
        CaseKey {
            language: self.language.clone(),
            case_id: self.id.clone(),
        }
    }

    /// Before-code to show the models. Always `None` for generate cases, even if
    /// the value carries a stray `before`.
    pub fn before_code(&self) -> Option<&str> {
        match self.kind {
            TaskKind::Refactor => self.before.as_deref(),
            TaskKind::Generate => None,
        }
    }

    /// Checks the before-code invariant. Returns a human-readable reason on violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        match (self.kind, self.before.as_deref()) {
            (TaskKind::Generate, Some(_)) => {
                Err("generate case must not carry before-code".to_string())
            }
            (TaskKind::Refactor, None) => Err("refactor case requires before-code".to_string()),
            (TaskKind::Refactor, Some(b)) if b.trim().is_empty() => {
                Err("refactor case has empty before-code".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Recorded failure of a model call (kind plus message), kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&InvokeError> for FailureRecord {
    fn from(e: &InvokeError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Ok,
    GenerationFailed,
}

/// The product of one (case, candidate-model) generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub model: String,
    /// Extracted code; `None` when generation failed.
    pub code: Option<String>,
    /// Raw model reply before code extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub status: GenerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub latency_ms: u64,
}

impl CandidateResult {
    pub fn ok(model: impl Into<String>, code: String, raw_response: String) -> Self {
        Self {
            model: model.into(),
            code: Some(code),
            raw_response: Some(raw_response),
            status: GenerationStatus::Ok,
            failure: None,
            attempts: 0,
            latency_ms: 0,
        }
    }

    pub fn failed(model: impl Into<String>, failure: FailureRecord) -> Self {
        Self {
            model: model.into(),
            code: None,
            raw_response: None,
            status: GenerationStatus::GenerationFailed,
            failure: Some(failure),
            attempts: 0,
            latency_ms: 0,
        }
    }

    pub fn with_timing(mut self, attempts: u32, latency_ms: u64) -> Self {
        self.attempts = attempts;
        self.latency_ms = latency_ms;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == GenerationStatus::Ok
    }
}

/// A judge score, always 0, 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct JudgeScore(u8);

impl JudgeScore {
    pub const MAX: u8 = 2;
    pub const ZERO: JudgeScore = JudgeScore(0);

    pub fn new(value: i64) -> Option<Self> {
        (0..=i64::from(Self::MAX))
            .contains(&value)
            .then_some(JudgeScore(value as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for JudgeScore {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        JudgeScore::new(value).ok_or_else(|| format!("judge score out of range: {}", value))
    }
}

impl From<JudgeScore> for u8 {
    fn from(s: JudgeScore) -> u8 {
        s.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    /// The judge answered but the answer failed validation.
    Malformed,
    /// The judge could not be reached.
    GradingFailed,
}

pub const NO_CANDIDATE_RATIONALE: &str = "no candidate produced";

/// Graded result for one candidate. A score exists iff the status is `Valid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VerdictRepr", into = "VerdictRepr")]
pub struct Verdict {
    score: Option<JudgeScore>,
    rationale: String,
    status: ValidationStatus,
    judge_calls: u32,
    failure: Option<FailureRecord>,
}

impl Verdict {
    pub fn valid(score: JudgeScore, rationale: impl Into<String>, judge_calls: u32) -> Self {
        Self {
            score: Some(score),
            rationale: rationale.into(),
            status: ValidationStatus::Valid,
            judge_calls,
            failure: None,
        }
    }

    /// Synthesized zero for a pair whose generation failed; no judge call is made.
    pub fn no_candidate() -> Self {
        Self::valid(JudgeScore::ZERO, NO_CANDIDATE_RATIONALE, 0)
    }

    pub fn malformed(detail: impl Into<String>, judge_calls: u32) -> Self {
        Self {
            score: None,
            rationale: detail.into(),
            status: ValidationStatus::Malformed,
            judge_calls,
            failure: None,
        }
    }

    pub fn grading_failed(error: &InvokeError, judge_calls: u32) -> Self {
        Self {
            score: None,
            rationale: error.to_string(),
            status: ValidationStatus::GradingFailed,
            judge_calls,
            failure: Some(FailureRecord::from(error)),
        }
    }

    pub fn score(&self) -> Option<JudgeScore> {
        self.score
    }

    /// Score as counted by aggregation: non-valid verdicts count as 0.
    pub fn effective_points(&self) -> u32 {
        self.score.map(|s| u32::from(s.get())).unwrap_or(0)
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn status(&self) -> ValidationStatus {
        self.status
    }

    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Valid
    }

    pub fn judge_calls(&self) -> u32 {
        self.judge_calls
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }
}

#[derive(Serialize, Deserialize)]
struct VerdictRepr {
    #[serde(default)]
    score: Option<JudgeScore>,
    rationale: String,
    status: ValidationStatus,
    #[serde(default)]
    judge_calls: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<FailureRecord>,
}

impl TryFrom<VerdictRepr> for Verdict {
    type Error = String;

    fn try_from(r: VerdictRepr) -> Result<Self, Self::Error> {
        match (r.status, r.score) {
            (ValidationStatus::Valid, None) => Err("valid verdict without a score".into()),
            (ValidationStatus::Malformed | ValidationStatus::GradingFailed, Some(_)) => {
                Err("only valid verdicts may carry a score".into())
            }
            _ => Ok(Self {
                score: r.score,
                rationale: r.rationale,
                status: r.status,
                judge_calls: r.judge_calls,
                failure: r.failure,
            }),
        }
    }
}

impl From<Verdict> for VerdictRepr {
    fn from(v: Verdict) -> Self {
        Self {
            score: v.score,
            rationale: v.rationale,
            status: v.status,
            judge_calls: v.judge_calls,
            failure: v.failure,
        }
    }
}

/// Lifecycle of one (case, model) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    Pending,
    Generating,
    Generated,
    GenerationFailed,
    Grading,
    Graded,
    GradingFailed,
}

impl PairState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PairState::Graded | PairState::GenerationFailed | PairState::GradingFailed
        )
    }

    pub fn can_transition_to(self, next: PairState) -> bool {
        use PairState::*;
        matches!(
            (self, next),
            (Pending, Generating)
                | (Generating, Generated)
                | (Generating, GenerationFailed)
                | (Generated, Grading)
                | (Grading, Graded)
                | (Grading, GradingFailed)
        )
    }
}

/// Store key: one per (case, candidate model).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutcomeKey {
    pub language: String,
    pub case_id: String,
    pub model: String,
}

impl OutcomeKey {
    pub fn new(case: &CaseKey, model: impl Into<String>) -> Self {
        Self {
            language: case.language.clone(),
            case_id: case.case_id.clone(),
            model: model.into(),
        }
    }
}

impl fmt::Display for OutcomeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.language, self.case_id, self.model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub key: OutcomeKey,
    pub candidate: CandidateResult,
    pub verdict: Verdict,
    pub state: PairState,
    /// Write order within the store that produced it; later writes win on duplicate keys.
    pub sequence: u64,
}

impl Outcome {
    /// True when the pair scored through infrastructure failure rather than the judge.
    pub fn is_infrastructure_failure(&self) -> bool {
        !self.candidate.is_ok() || !self.verdict.is_valid()
    }
}
