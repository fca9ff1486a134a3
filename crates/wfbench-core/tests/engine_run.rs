//! End-to-end runs of the engine against in-process clients.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wfbench_core::aggregate::aggregate;
use wfbench_core::engine::{RunOptions, RunPolicy, Runner};
use wfbench_core::errors::{FailureKind, InvokeError};
use wfbench_core::invoker::{ModelInvoker, RetryPolicy};
use wfbench_core::model::{GenerationStatus, OutcomeKey, PairState, TestCase, ValidationStatus};
use wfbench_core::prompts::TemplatePrompts;
use wfbench_core::providers::llm::fake::FakeClient;
use wfbench_core::providers::llm::LlmClient;
use wfbench_core::report::progress::ProgressEvent;

fn invoker() -> ModelInvoker {
    ModelInvoker::new(RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 5,
        timeout_secs: 30,
    })
}

fn runner(invoker: ModelInvoker, concurrency: usize) -> Runner {
    Runner::new(
        Arc::new(invoker),
        Arc::new(TemplatePrompts::builtin()),
        "judge",
        RunPolicy { concurrency },
    )
}

fn cases() -> Vec<TestCase> {
    vec![
        TestCase::refactor("python", "p1", "retry a payment", "pay()", "GOLD-P1"),
        TestCase::refactor("python", "p2", "fan out", "fan()", "GOLD-P2"),
        TestCase::refactor("typescript", "t1", "saga", "saga()", "GOLD-T1"),
        TestCase::refactor("typescript", "t2", "timer", "sleep()", "GOLD-T2"),
    ]
}

/// Judge that scores by which golden solution appears in the grading prompt.
fn judge_by_golden(scores: &'static [(&'static str, i64)]) -> Arc<FakeClient> {
    Arc::new(FakeClient::from_fn("judge", move |prompt| {
        let score = scores
            .iter()
            .find(|(gold, _)| prompt.contains(gold))
            .map(|(_, s)| *s)
            .unwrap_or(0);
        Ok(format!(r#"{{"score": {}, "rationale": "graded"}}"#, score))
    }))
}

fn key(lang: &str, case: &str, model: &str) -> OutcomeKey {
    OutcomeKey {
        language: lang.into(),
        case_id: case.into(),
        model: model.into(),
    }
}

#[tokio::test]
async fn scores_two_languages_end_to_end() {
    let cand = Arc::new(FakeClient::new("cand".into()).with_response("```\nnew()\n```".into()));
    let judge = judge_by_golden(&[("GOLD-P1", 2), ("GOLD-P2", 2), ("GOLD-T1", 1), ("GOLD-T2", 0)]);
    let r = runner(invoker().with_client(cand).with_client(judge), 3);

    let set = r.run(&cases(), &["cand".to_string()], RunOptions::default()).await;
    assert!(!set.cancelled);
    assert_eq!(set.outcomes.len(), 4);
    assert!(set.outcomes.iter().all(|o| o.state == PairState::Graded));

    let agg = aggregate(&set.outcomes);
    let m = agg.model("cand").unwrap();
    assert_eq!(m.language("python").unwrap().score, 100.0);
    assert_eq!(m.language("typescript").unwrap().score, 25.0);
    assert_eq!(m.overall, 62.5);
}

#[tokio::test]
async fn auth_failure_is_isolated_to_its_model() {
    let good = Arc::new(FakeClient::new("good".into()).with_response("code".into()));
    let bad = Arc::new(FakeClient::from_fn("bad", |_| {
        Err(InvokeError::Auth {
            model: "bad".into(),
            message: "invalid api key".into(),
        })
    }));
    let judge = judge_by_golden(&[("GOLD-P1", 2), ("GOLD-P2", 2), ("GOLD-T1", 2), ("GOLD-T2", 2)]);
    let r = runner(invoker().with_client(good).with_client(bad.clone()).with_client(judge.clone()), 4);

    let set = r
        .run(&cases(), &["good".to_string(), "bad".to_string()], RunOptions::default())
        .await;
    assert_eq!(set.outcomes.len(), 8);

    for o in &set.outcomes {
        if o.key.model == "bad" {
            assert_eq!(o.state, PairState::GenerationFailed);
            assert_eq!(o.candidate.status, GenerationStatus::GenerationFailed);
            assert_eq!(
                o.candidate.failure.as_ref().map(|f| f.kind),
                Some(FailureKind::AuthError)
            );
        } else {
            assert_eq!(o.state, PairState::Graded);
            assert_eq!(o.verdict.effective_points(), 2);
        }
    }
    // Auth errors are not retried.
    assert_eq!(bad.calls(), 4);
    // The judge only saw the good model's candidates.
    assert_eq!(judge.calls(), 4);

    let agg = aggregate(&set.outcomes);
    assert_eq!(agg.model("good").unwrap().overall, 100.0);
    let b = agg.model("bad").unwrap();
    assert_eq!(b.overall, 0.0);
    assert_eq!(b.breakdown.generation_failed, 4);
}

#[tokio::test]
async fn unconfigured_candidate_fails_per_pair() {
    let cand = Arc::new(FakeClient::new("cand".into()).with_response("code".into()));
    let judge = judge_by_golden(&[]);
    let r = runner(invoker().with_client(cand).with_client(judge), 2);

    let set = r
        .run(&cases()[..1], &["cand".to_string(), "ghost".to_string()], RunOptions::default())
        .await;
    let ghost = set.get(&key("python", "p1", "ghost")).unwrap();
    assert_eq!(
        ghost.candidate.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::UnknownModel)
    );
    assert!(ghost.verdict.is_valid());
    assert_eq!(ghost.verdict.effective_points(), 0);
    assert_eq!(
        set.get(&key("python", "p1", "cand")).unwrap().state,
        PairState::Graded
    );
}

#[tokio::test]
async fn malformed_verdicts_are_retried_once_then_flagged() {
    let cand = Arc::new(FakeClient::new("cand".into()).with_response("code".into()));
    let judge = Arc::new(FakeClient::from_fn("judge", |_| Ok(r#"{"score": 5}"#.to_string())));
    let r = runner(invoker().with_client(cand).with_client(judge.clone()), 2);

    let set = r.run(&cases()[..2], &["cand".to_string()], RunOptions::default()).await;
    assert_eq!(judge.calls(), 4);
    for o in &set.outcomes {
        assert_eq!(o.state, PairState::Graded);
        assert_eq!(o.verdict.status(), ValidationStatus::Malformed);
        assert!(o.verdict.score().is_none());
        assert_eq!(o.verdict.judge_calls(), 2);
    }
    let agg = aggregate(&set.outcomes);
    let m = agg.model("cand").unwrap();
    assert_eq!(m.overall, 0.0);
    assert_eq!(m.breakdown.malformed, 2);
    assert_eq!(m.breakdown.judged, 0);
}

#[tokio::test]
async fn unreachable_judge_marks_grading_failed() {
    let cand = Arc::new(FakeClient::new("cand".into()).with_response("code".into()));
    let judge = Arc::new(FakeClient::from_fn("judge", |_| {
        Err(InvokeError::Provider {
            model: "judge".into(),
            status: Some(502),
            message: "bad gateway".into(),
        })
    }));
    let r = runner(invoker().with_client(cand).with_client(judge.clone()), 1);

    let set = r.run(&cases()[..1], &["cand".to_string()], RunOptions::default()).await;
    let o = &set.outcomes[0];
    assert_eq!(o.state, PairState::GradingFailed);
    assert_eq!(o.verdict.status(), ValidationStatus::GradingFailed);
    assert!(o.candidate.is_ok());
    // One logical judge call, retried by the invoker up to its cap.
    assert_eq!(o.verdict.judge_calls(), 1);
    assert_eq!(judge.calls(), 2);
}

#[tokio::test]
async fn generate_cases_omit_before_code() {
    let cand = Arc::new(FakeClient::new("cand".into()).with_response("code".into()));
    let judge = judge_by_golden(&[("GOLD-G", 1)]);
    let r = runner(invoker().with_client(cand.clone()).with_client(judge.clone()), 1);

    let case = TestCase::generate("go", "g1", "write an order workflow", "GOLD-G");
    let set = r.run(&[case], &["cand".to_string()], RunOptions::default()).await;
    assert_eq!(set.outcomes[0].verdict.effective_points(), 1);

    let prompt = &cand.prompts()[0];
    assert!(prompt.contains("write an order workflow"));
    assert!(!prompt.contains("<before_code>"));
    assert!(!judge.prompts()[0].contains("<original_code>"));
}

/// Candidate client that records how many calls overlap.
struct GaugeClient {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl LlmClient for GaugeClient {
    async fn complete(&self, _prompt: &str, _expects_json: bool) -> Result<String, InvokeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok("code".into())
    }

    fn model_id(&self) -> &str {
        "gauge"
    }

    fn provider_name(&self) -> &'static str {
        "gauge"
    }
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_pool_size() {
    let gauge = Arc::new(GaugeClient {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let judge = judge_by_golden(&[]);
    let r = runner(invoker().with_client(gauge.clone()).with_client(judge), 2);

    let many: Vec<TestCase> = (0..8)
        .map(|i| TestCase::refactor("python", format!("c{}", i), "d", "x", "y"))
        .collect();
    let set = r.run(&many, &["gauge".to_string()], RunOptions::default()).await;
    assert_eq!(set.outcomes.len(), 8);
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn progress_sink_sees_every_pair() {
    let cand = Arc::new(FakeClient::new("cand".into()).with_response("code".into()));
    let judge = judge_by_golden(&[]);
    let r = runner(invoker().with_client(cand).with_client(judge), 2);

    let seen: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    let opts = RunOptions {
        progress: Some(Arc::new(move |ev: ProgressEvent| {
            sink_seen.lock().unwrap().push((ev.done, ev.total));
        })),
        ..RunOptions::default()
    };
    r.run(&cases(), &["cand".to_string()], opts).await;

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
}

#[tokio::test]
async fn resume_skips_pairs_with_valid_verdicts() {
    // First run: the judge cannot be reached for p2.
    let cand = Arc::new(FakeClient::new("cand".into()).with_response("code".into()));
    let flaky_judge = Arc::new(FakeClient::from_fn("judge", |prompt| {
        if prompt.contains("GOLD-P2") {
            Err(InvokeError::Timeout {
                model: "judge".into(),
                elapsed: Duration::from_secs(1),
            })
        } else {
            Ok(r#"{"score": 2, "rationale": "ok"}"#.to_string())
        }
    }));
    let first = runner(invoker().with_client(cand).with_client(flaky_judge), 2)
        .run(&cases()[..2], &["cand".to_string()], RunOptions::default())
        .await;
    assert_eq!(
        first.get(&key("python", "p2", "cand")).unwrap().state,
        PairState::GradingFailed
    );

    // Second run: only p2 is re-run.
    let cand2 = Arc::new(FakeClient::new("cand".into()).with_response("code".into()));
    let judge2 = judge_by_golden(&[("GOLD-P2", 1)]);
    let second = runner(invoker().with_client(cand2.clone()).with_client(judge2.clone()), 2)
        .run(
            &cases()[..2],
            &["cand".to_string()],
            RunOptions {
                resume_from: Some(first.clone()),
                ..RunOptions::default()
            },
        )
        .await;

    assert_eq!(cand2.calls(), 1);
    assert_eq!(judge2.calls(), 1);
    assert_ne!(second.run_id, first.run_id);
    let p1 = second.get(&key("python", "p1", "cand")).unwrap();
    assert_eq!(p1.verdict, first.get(&key("python", "p1", "cand")).unwrap().verdict);
    assert_eq!(
        second.get(&key("python", "p2", "cand")).unwrap().verdict.effective_points(),
        1
    );
    assert_eq!(aggregate(&second.outcomes).model("cand").unwrap().overall, 75.0);
}

#[tokio::test]
async fn resume_can_retry_generation_failures() {
    let down = Arc::new(FakeClient::from_fn("cand", |_| {
        Err(InvokeError::Auth {
            model: "cand".into(),
            message: "expired".into(),
        })
    }));
    let first = runner(invoker().with_client(down).with_client(judge_by_golden(&[])), 1)
        .run(&cases()[..1], &["cand".to_string()], RunOptions::default())
        .await;
    assert_eq!(first.outcomes[0].state, PairState::GenerationFailed);

    // Literal resume keeps the synthesized zero: it is a valid verdict.
    let cand = Arc::new(FakeClient::new("cand".into()).with_response("code".into()));
    let judge = judge_by_golden(&[("GOLD-P1", 2)]);
    let kept = runner(invoker().with_client(cand.clone()).with_client(judge.clone()), 1)
        .run(
            &cases()[..1],
            &["cand".to_string()],
            RunOptions {
                resume_from: Some(first.clone()),
                ..RunOptions::default()
            },
        )
        .await;
    assert_eq!(cand.calls(), 0);
    assert_eq!(kept.outcomes[0].state, PairState::GenerationFailed);

    let retried = runner(invoker().with_client(cand.clone()).with_client(judge), 1)
        .run(
            &cases()[..1],
            &["cand".to_string()],
            RunOptions {
                resume_from: Some(first),
                retry_generation_failures: true,
                ..RunOptions::default()
            },
        )
        .await;
    assert_eq!(cand.calls(), 1);
    assert_eq!(retried.outcomes[0].verdict.effective_points(), 2);
}
