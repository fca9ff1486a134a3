//! Deterministic in-process client for tests and dry runs.

use crate::errors::InvokeError;
use crate::providers::llm::LlmClient;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Arc<dyn Fn(&str) -> Result<String, InvokeError> + Send + Sync>;

enum Script {
    Fixed(String),
    Queue(Mutex<VecDeque<Result<String, InvokeError>>>),
    Func(Responder),
}

pub struct FakeClient {
    model: String,
    script: Script,
    delay: Option<Duration>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl FakeClient {
    /// Always answers `"ok"`.
    pub fn new(model: String) -> Self {
        Self::build(model, Script::Fixed("ok".to_string()))
    }

    pub fn with_response(mut self, text: String) -> Self {
        self.script = Script::Fixed(text);
        self
    }

    /// Replies are consumed in order. An exhausted queue yields `EmptyResponse`.
    pub fn scripted(
        model: impl Into<String>,
        replies: impl IntoIterator<Item = Result<String, InvokeError>>,
    ) -> Self {
        Self::build(
            model.into(),
            Script::Queue(Mutex::new(replies.into_iter().collect())),
        )
    }

    /// The reply is computed from the prompt.
    pub fn from_fn<F>(model: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> Result<String, InvokeError> + Send + Sync + 'static,
    {
        Self::build(model.into(), Script::Func(Arc::new(f)))
    }

    /// Sleeps before answering, so concurrency tests can observe overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn build(model: String, script: Script) -> Self {
        Self {
            model,
            script,
            delay: None,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, prompt: &str, _expects_json: bool) -> Result<String, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match &self.script {
            Script::Fixed(text) => Ok(text.clone()),
            Script::Queue(queue) => {
                let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                next.unwrap_or_else(|| {
                    Err(InvokeError::EmptyResponse {
                        model: self.model.clone(),
                    })
                })
            }
            Script::Func(f) => f(prompt),
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_are_consumed_in_order() {
        let c = FakeClient::scripted(
            "m",
            [
                Ok("a".to_string()),
                Err(InvokeError::Auth {
                    model: "m".into(),
                    message: "no".into(),
                }),
            ],
        );
        assert_eq!(c.complete("p", false).await.unwrap(), "a");
        assert!(matches!(
            c.complete("p", false).await,
            Err(InvokeError::Auth { .. })
        ));
        assert!(matches!(
            c.complete("p", false).await,
            Err(InvokeError::EmptyResponse { .. })
        ));
        assert_eq!(c.calls(), 3);
    }

    #[tokio::test]
    async fn from_fn_sees_prompt() {
        let c = FakeClient::from_fn("m", |p| Ok(p.to_uppercase()));
        assert_eq!(c.complete("abc", false).await.unwrap(), "ABC");
        assert_eq!(c.prompts(), vec!["abc".to_string()]);
    }
}
