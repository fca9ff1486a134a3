pub mod llm;

use crate::config::{BenchConfig, CredentialResolver, Provider};
use crate::errors::ConfigError;
use crate::invoker::ModelInvoker;
use llm::openai::OpenAIClient;
use llm::LlmClient;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds a client for every configured model whose credential resolves.
///
/// Models without a credential are left out; their pairs later fail with
/// `UnknownModel`. Fails when nothing can be registered or when the judge
/// has no credential.
pub fn build_invoker(
    config: &BenchConfig,
    credentials: &dyn CredentialResolver,
) -> Result<ModelInvoker, ConfigError> {
    let mut invoker = ModelInvoker::new(config.retry.clone());

    for spec in &config.models {
        let Some(secret) = credentials.resolve_credential(spec) else {
            warn!(
                model = %spec.id,
                env = spec.api_key_env.as_deref().unwrap_or("-"),
                "no credential resolved, model not registered"
            );
            continue;
        };
        let client: Arc<dyn LlmClient> = match spec.provider {
            Provider::Openai => Arc::new(
                OpenAIClient::new(spec, secret).map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
        };
        info!(model = %spec.id, provider = client.provider_name(), "registered model");
        invoker.register(client);
    }

    if invoker.model_ids().is_empty() {
        return Err(ConfigError::NoCredentials);
    }
    if let Some(judge) = config.judge.as_deref() {
        if !invoker.has_model(judge) {
            return Err(ConfigError::JudgeUnavailable(judge.to_string()));
        }
    }
    Ok(invoker)
}
