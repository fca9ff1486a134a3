//! Model Invoker: one logical call to a named model, with bounded retry.
//!
//! The invoker owns retry, backoff and per-attempt timeouts. It does not cap
//! concurrency; the engine's worker pool is the only fan-out limit.

use crate::errors::InvokeError;
use crate::providers::llm::LlmClient;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total calls allowed for one logical invocation, first attempt included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-attempt timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    ///
    /// A provider `Retry-After` is honored (capped at `max_delay_ms`, ±10% jitter).
    /// Otherwise exponential `base * 2^(attempt-1)`, capped, with full jitter.
    pub fn backoff(&self, attempt: u32, err: &InvokeError) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        let mut rng = rand::thread_rng();

        if let Some(retry_after) = err.retry_after() {
            let base_ms = retry_after.min(cap).as_millis() as u64;
            let jitter: f64 = rng.gen_range(0.9_f64..=1.1_f64);
            let ms = ((base_ms as f64) * jitter).round() as u64;
            return Duration::from_millis(ms.min(self.max_delay_ms));
        }

        let shift = attempt.saturating_sub(1).min(20);
        let exp_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms);
        Duration::from_millis(rng.gen_range(0..=exp_ms))
    }
}

/// Successful logical call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub text: String,
    pub attempts: u32,
    pub latency: Duration,
}

/// Full record of a logical call, success or not.
#[derive(Debug)]
pub struct InvocationReport {
    pub outcome: Result<String, InvokeError>,
    pub attempts: u32,
    pub latency: Duration,
}

impl InvocationReport {
    pub fn into_result(self) -> Result<Invocation, InvokeError> {
        let InvocationReport {
            outcome,
            attempts,
            latency,
        } = self;
        outcome.map(|text| Invocation {
            text,
            attempts,
            latency,
        })
    }
}

/// Registry of model clients plus the retry policy applied to every call.
#[derive(Clone)]
pub struct ModelInvoker {
    clients: HashMap<String, Arc<dyn LlmClient>>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ModelInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInvoker")
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ModelInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            clients: HashMap::new(),
            policy,
        }
    }

    /// Registers `client` under its own `model_id()`. Replaces any previous client.
    pub fn register(&mut self, client: Arc<dyn LlmClient>) {
        self.clients.insert(client.model_id().to_string(), client);
    }

    pub fn with_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.register(client);
        self
    }

    pub fn has_model(&self, model_id: &str) -> bool {
        self.clients.contains_key(model_id)
    }

    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn invoke(
        &self,
        model_id: &str,
        prompt: &str,
        expects_json: bool,
    ) -> Result<Invocation, InvokeError> {
        self.invoke_detailed(model_id, prompt, expects_json)
            .await
            .into_result()
    }

    /// Like [`invoke`](Self::invoke) but also reports attempts and latency on failure.
    pub async fn invoke_detailed(
        &self,
        model_id: &str,
        prompt: &str,
        expects_json: bool,
    ) -> InvocationReport {
        let started = Instant::now();
        let done = |outcome, attempts| InvocationReport {
            outcome,
            attempts,
            latency: started.elapsed(),
        };

        if prompt.trim().is_empty() {
            return done(
                Err(InvokeError::InvalidRequest {
                    model: model_id.to_string(),
                    message: "prompt is empty".into(),
                }),
                0,
            );
        }
        let Some(client) = self.clients.get(model_id) else {
            return done(
                Err(InvokeError::UnknownModel {
                    model: model_id.to_string(),
                }),
                0,
            );
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = self.policy.timeout();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_start = Instant::now();
            let result =
                match tokio::time::timeout(timeout, client.complete(prompt, expects_json)).await {
                    Ok(Ok(text)) if text.trim().is_empty() => Err(InvokeError::EmptyResponse {
                        model: model_id.to_string(),
                    }),
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(InvokeError::Timeout { model, .. })) => Err(InvokeError::Timeout {
                        model,
                        elapsed: attempt_start.elapsed(),
                    }),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(InvokeError::Timeout {
                        model: model_id.to_string(),
                        elapsed: timeout,
                    }),
                };
            let latency_ms = attempt_start.elapsed().as_millis() as u64;

            match result {
                Ok(text) => {
                    info!(
                        model = model_id,
                        provider = client.provider_name(),
                        attempt,
                        latency_ms,
                        outcome = "ok",
                        "model call"
                    );
                    return done(Ok(text), attempt);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.policy.backoff(attempt, &e);
                    warn!(
                        model = model_id,
                        attempt,
                        max_attempts,
                        latency_ms,
                        outcome = %e.kind(),
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(
                        model = model_id,
                        attempt,
                        max_attempts,
                        latency_ms,
                        outcome = %e.kind(),
                        error = %e,
                        "model call failed"
                    );
                    return done(Err(e), attempt);
                }
            }
        }
    }
}
