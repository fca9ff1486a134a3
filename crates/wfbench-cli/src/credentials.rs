use wfbench_core::config::{CredentialResolver, ModelSpec, Secret};

/// Resolves credentials from the environment variable named by `api_key_env`.
///
/// Models without `api_key_env` get an empty credential, which the client
/// treats as "send no Authorization header" (local endpoints).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialResolver for EnvCredentials {
    fn resolve_credential(&self, model: &ModelSpec) -> Option<Secret> {
        match model.api_key_env.as_deref() {
            None => Some(Secret::new("")),
            Some(var) => std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(Secret::new),
        }
    }
}
