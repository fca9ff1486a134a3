use crate::engine::extract::extract_code;
use crate::errors::InvokeError;
use crate::invoker::ModelInvoker;
use crate::judge::GradingEngine;
use crate::model::{
    CandidateResult, CaseKey, FailureRecord, Outcome, OutcomeKey, PairState, TestCase,
    ValidationStatus, Verdict,
};
use crate::prompts::PromptRenderer;
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::store::{OutcomeSet, OutcomeStore, StoreError, OUTCOMES_SCHEMA_VERSION};
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Maximum pairs in flight. This is the only fan-out cap in the system.
    pub concurrency: usize,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            concurrency: crate::config::DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Clone, Default)]
pub struct RunOptions {
    /// Prior outcome set; pairs with a valid verdict there are carried forward.
    pub resume_from: Option<OutcomeSet>,
    pub progress: Option<ProgressSink>,
    /// With `resume_from`, also re-run pairs whose generation failed.
    pub retry_generation_failures: bool,
}

/// Cooperative cancellation: once set, no new pairs are scheduled.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Orchestration Engine.
pub struct Runner {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<dyn PromptRenderer>,
    grader: GradingEngine,
    policy: RunPolicy,
    cancel: CancelFlag,
}

/// What one pair task needs. Cheap to clone into the task.
#[derive(Clone)]
struct PairContext {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<dyn PromptRenderer>,
    grader: GradingEngine,
}

impl Runner {
    pub fn new(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<dyn PromptRenderer>,
        judge_model: impl Into<String>,
        policy: RunPolicy,
    ) -> Self {
        let grader = GradingEngine::new(invoker.clone(), prompts.clone(), judge_model);
        Self {
            invoker,
            prompts,
            grader,
            policy,
            cancel: CancelFlag::new(),
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn judge_model(&self) -> &str {
        self.grader.judge_model()
    }

    /// Runs every (case, model) pair and returns the outcome set.
    ///
    /// Pair failures are recorded on the pair; this never fails as a whole.
    /// Outcomes come back sorted by key regardless of completion order.
    pub async fn run(&self, cases: &[TestCase], models: &[String], opts: RunOptions) -> OutcomeSet {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        let cases = dedup_cases(cases);
        let models = dedup_models(models);

        let mut store = OutcomeStore::new();
        let carried = opts
            .resume_from
            .as_ref()
            .map(|prior| carry_forward(prior, &cases, &models, opts.retry_generation_failures, &mut store))
            .unwrap_or(0);

        let pending: Vec<(Arc<TestCase>, String)> = cases
            .iter()
            .flat_map(|case| models.iter().map(move |m| (case.clone(), m.clone())))
            .filter(|(case, m)| !store.contains(&OutcomeKey::new(&case.key(), m.as_str())))
            .collect();

        let total = pending.len();
        info!(
            run_id = %run_id,
            cases = cases.len(),
            models = models.len(),
            pairs = total,
            carried,
            concurrency = self.policy.concurrency,
            judge = %self.judge_model(),
            "starting run"
        );

        let sem = Arc::new(Semaphore::new(self.policy.concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let mut scheduled: Vec<OutcomeKey> = Vec::with_capacity(total);
        let mut done = 0usize;
        let mut cancelled = false;

        for (case, model) in pending {
            while let Some(res) = join_set.try_join_next() {
                self.collect(res, &mut store, &mut done, total, &opts);
            }
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let permit = match sem.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            // Cancellation may have arrived while waiting for a slot.
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let key = OutcomeKey::new(&case.key(), model.as_str());
            scheduled.push(key);
            let ctx = self.pair_context();
            join_set.spawn(async move {
                let _permit = permit;
                ctx.run_pair(&case, &model).await
            });
        }

        if cancelled {
            warn!(
                scheduled = scheduled.len(),
                total, "run cancelled, waiting for in-flight pairs"
            );
        }

        while let Some(res) = join_set.join_next().await {
            self.collect(res, &mut store, &mut done, total, &opts);
        }

        // A pair task that panicked has no outcome; record it so no scheduled pair is lost.
        for key in &scheduled {
            if !store.contains(key) {
                error!(pair = %key, "pair task aborted without an outcome");
                let outcome = aborted_outcome(key.clone());
                if let Err(e) = store.record(outcome) {
                    error!(pair = %key, error = %e, "failed to record aborted pair");
                }
            }
        }

        let outcomes = store.into_outcomes();
        info!(
            run_id = %run_id,
            outcomes = outcomes.len(),
            cancelled,
            "run finished"
        );

        OutcomeSet {
            schema_version: OUTCOMES_SCHEMA_VERSION,
            run_id,
            started_at,
            finished_at: Utc::now(),
            judge_model: self.judge_model().to_string(),
            candidates: models,
            cancelled,
            outcomes,
        }
    }

    fn pair_context(&self) -> PairContext {
        PairContext {
            invoker: self.invoker.clone(),
            prompts: self.prompts.clone(),
            grader: self.grader.clone(),
        }
    }

    fn collect(
        &self,
        res: Result<Outcome, tokio::task::JoinError>,
        store: &mut OutcomeStore,
        done: &mut usize,
        total: usize,
        opts: &RunOptions,
    ) {
        let outcome = match res {
            Ok(o) => o,
            Err(e) => {
                error!(error = %e, "pair task failed to join");
                return;
            }
        };
        let key = outcome.key.clone();
        let state = outcome.state;
        match store.record(outcome) {
            Ok(_) => {}
            Err(StoreError::DuplicateKey(k)) => {
                error!(pair = %k, "pair produced a second outcome; keeping the first");
                return;
            }
            Err(e) => {
                error!(pair = %key, error = %e, "failed to record outcome");
                return;
            }
        }
        *done += 1;
        if let Some(sink) = &opts.progress {
            sink(ProgressEvent {
                done: *done,
                total,
                key,
                state,
            });
        }
    }
}

impl PairContext {
    async fn run_pair(&self, case: &TestCase, model: &str) -> Outcome {
        let key = OutcomeKey::new(&case.key(), model);
        let mut state = PairState::Pending;
        transition(&key, &mut state, PairState::Generating);

        let prompt =
            self.prompts
                .render_refactor_prompt(&case.language, &case.description, case.before_code());
        let report = self.invoker.invoke_detailed(model, &prompt, false).await;
        let latency_ms = report.latency.as_millis() as u64;

        let generated = report.outcome.and_then(|raw| {
            let code = extract_code(&raw, &case.language);
            if code.trim().is_empty() {
                Err(InvokeError::EmptyResponse {
                    model: model.to_string(),
                })
            } else {
                Ok((code, raw))
            }
        });

        let candidate = match generated {
            Ok((code, raw)) => {
                transition(&key, &mut state, PairState::Generated);
                CandidateResult::ok(model, code, raw).with_timing(report.attempts, latency_ms)
            }
            Err(e) => {
                transition(&key, &mut state, PairState::GenerationFailed);
                warn!(pair = %key, kind = %e.kind(), error = %e, "generation failed");
                let verdict = self.grader.grade(case.before_code(), &case.golden, None).await;
                return Outcome {
                    key,
                    candidate: CandidateResult::failed(model, FailureRecord::from(&e))
                        .with_timing(report.attempts, latency_ms),
                    verdict,
                    state,
                    sequence: 0,
                };
            }
        };

        transition(&key, &mut state, PairState::Grading);
        let verdict = self
            .grader
            .grade(case.before_code(), &case.golden, candidate.code.as_deref())
            .await;
        let terminal = match verdict.status() {
            ValidationStatus::GradingFailed => PairState::GradingFailed,
            ValidationStatus::Valid | ValidationStatus::Malformed => PairState::Graded,
        };
        transition(&key, &mut state, terminal);

        info!(
            pair = %key,
            status = ?verdict.status(),
            score = verdict.score().map(|s| s.get()),
            judge_calls = verdict.judge_calls(),
            "pair graded"
        );

        Outcome {
            key,
            candidate,
            verdict,
            state,
            sequence: 0,
        }
    }
}

fn transition(key: &OutcomeKey, state: &mut PairState, next: PairState) {
    debug_assert!(state.can_transition_to(next), "{:?} -> {:?}", state, next);
    debug!(pair = %key, from = ?*state, to = ?next, "pair state");
    *state = next;
}

fn dedup_cases(cases: &[TestCase]) -> Vec<Arc<TestCase>> {
    let mut seen: HashSet<CaseKey> = HashSet::new();
    let mut out = Vec::with_capacity(cases.len());
    for case in cases {
        if seen.insert(case.key()) {
            out.push(Arc::new(case.clone()));
        } else {
            warn!(case = %case.key(), "duplicate case ignored");
        }
    }
    out
}

fn dedup_models(models: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    models
        .iter()
        .filter(|m| seen.insert(m.as_str()))
        .cloned()
        .collect()
}

/// Seeds `store` with prior outcomes that need no re-run. Returns how many were carried.
fn carry_forward(
    prior: &OutcomeSet,
    cases: &[Arc<TestCase>],
    models: &[String],
    retry_generation_failures: bool,
    store: &mut OutcomeStore,
) -> usize {
    let wanted: HashSet<OutcomeKey> = cases
        .iter()
        .flat_map(|c| models.iter().map(move |m| OutcomeKey::new(&c.key(), m.as_str())))
        .collect();

    let mut reusable: Vec<&Outcome> = prior
        .resumable()
        .filter(|o| wanted.contains(&o.key))
        .filter(|o| !(retry_generation_failures && !o.candidate.is_ok()))
        .collect();
    reusable.sort_by_key(|o| o.sequence);

    let mut carried = 0;
    for o in reusable {
        // Later writes of the same key replace earlier ones.
        if store.contains(&o.key) {
            continue;
        }
        if store.record(o.clone()).is_ok() {
            carried += 1;
        }
    }
    if carried > 0 {
        info!(carried, from_run = %prior.run_id, "resuming: carried forward valid outcomes");
    }
    carried
}

fn aborted_outcome(key: OutcomeKey) -> Outcome {
    let model = key.model.clone();
    let failure = FailureRecord {
        kind: crate::errors::FailureKind::ProviderError,
        message: "pair task aborted before producing an outcome".into(),
    };
    Outcome {
        key,
        candidate: CandidateResult::failed(model, failure),
        verdict: Verdict::no_candidate(),
        state: PairState::GenerationFailed,
        sequence: 0,
    }
}
