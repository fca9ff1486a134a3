//! Grading Engine: asks the judge model for a structured verdict.

mod parse;

pub use parse::{parse_judge_reply, JudgeReply, MalformedReason};

use crate::invoker::ModelInvoker;
use crate::model::Verdict;
use crate::prompts::PromptRenderer;
use std::sync::Arc;
use tracing::{debug, warn};

/// Judge calls allowed per verdict: the first plus one retry on a malformed reply.
pub const MAX_JUDGE_CALLS: u32 = 2;

#[derive(Clone)]
pub struct GradingEngine {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<dyn PromptRenderer>,
    judge_model: String,
}

impl GradingEngine {
    pub fn new(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<dyn PromptRenderer>,
        judge_model: impl Into<String>,
    ) -> Self {
        Self {
            invoker,
            prompts,
            judge_model: judge_model.into(),
        }
    }

    pub fn judge_model(&self) -> &str {
        &self.judge_model
    }

    /// Grades one candidate against the golden solution.
    ///
    /// `candidate == None` means generation failed upstream: a valid zero is
    /// synthesized and the judge is not called.
    pub async fn grade(&self, before: Option<&str>, golden: &str, candidate: Option<&str>) -> Verdict {
        let Some(candidate) = candidate else {
            return Verdict::no_candidate();
        };

        let prompt = self.prompts.render_grading_prompt(before, golden, candidate);
        let mut calls = 0;
        let mut last_reason = None;

        while calls < MAX_JUDGE_CALLS {
            calls += 1;
            let text = match self.invoker.invoke(&self.judge_model, &prompt, true).await {
                Ok(inv) => inv.text,
                Err(e) => {
                    warn!(judge = %self.judge_model, call = calls, error = %e, "judge unreachable");
                    return Verdict::grading_failed(&e, calls);
                }
            };

            match parse_judge_reply(&text) {
                Ok(reply) => {
                    debug!(judge = %self.judge_model, call = calls, score = reply.score.get(), "verdict");
                    return Verdict::valid(reply.score, reply.rationale, calls);
                }
                Err(reason) => {
                    warn!(judge = %self.judge_model, call = calls, reason = %reason, "malformed judge reply");
                    last_reason = Some(reason);
                }
            }
        }

        let detail = last_reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "malformed judge reply".to_string());
        Verdict::malformed(detail, calls)
    }
}
