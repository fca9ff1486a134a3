pub mod fake;
pub mod openai;

use crate::errors::InvokeError;
use async_trait::async_trait;

/// One model endpoint. Implementations perform a single attempt; retry, backoff
/// and timeouts belong to [`crate::invoker::ModelInvoker`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends `prompt` and returns the raw text payload.
    ///
    /// `expects_json` is a hint that the caller will parse the reply as JSON;
    /// clients may use it to request a JSON response format but never parse.
    async fn complete(&self, prompt: &str, expects_json: bool) -> Result<String, InvokeError>;

    /// Id the client is registered under (the config `id`, not the provider-side name).
    fn model_id(&self) -> &str;

    fn provider_name(&self) -> &'static str;
}
