//! Bench configuration.
//!
//! The config is an explicit value handed to the engine at construction; nothing
//! in the core reads the environment. Credentials come in through
//! [`CredentialResolver`], supplied by the caller.

use crate::errors::ConfigError;
use crate::invoker::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Any endpoint speaking the OpenAI chat-completions protocol.
    #[default]
    #[serde(alias = "openai-compatible")]
    Openai,
}

/// One model endpoint, candidate or judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    #[serde(default)]
    pub provider: Provider,
    /// Provider-side model name; defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the credential the resolver should look up (e.g. an env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    4096
}

impl ModelSpec {
    pub fn provider_model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub models: Vec<ModelSpec>,
    /// Default candidate list; the CLI may override.
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub judge: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            candidates: Vec::new(),
            judge: None,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            corpus: None,
            templates: None,
        }
    }
}

impl BenchConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg = Self::from_yaml_str(&raw)?;
        // Relative paths in the file are relative to the file, not the cwd.
        if let Some(base) = path.parent() {
            cfg.corpus = cfg.corpus.map(|p| rebase(base, p));
            cfg.templates = cfg.templates.map(|p| rebase(base, p));
        }
        Ok(cfg)
    }

    pub fn model(&self, id: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn judge_model(&self) -> Result<&str, ConfigError> {
        self.judge
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("no judge model configured".into()))
    }

    /// Checks the config is internally consistent before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for m in &self.models {
            if m.id.trim().is_empty() {
                return Err(ConfigError::Invalid("model id must not be empty".into()));
            }
            if !seen.insert(m.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "model '{}' is defined twice",
                    m.id
                )));
            }
        }
        if self.candidates.is_empty() {
            return Err(ConfigError::Invalid(
                "no candidate models selected".into(),
            ));
        }
        for c in &self.candidates {
            if self.model(c).is_none() {
                return Err(ConfigError::UndefinedModel(c.clone()));
            }
        }
        let judge = self.judge_model()?;
        if self.model(judge).is_none() {
            return Err(ConfigError::UndefinedModel(judge.to_string()));
        }
        Ok(())
    }
}

fn rebase(base: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() || base.as_os_str().is_empty() {
        p
    } else {
        base.join(p)
    }
}

/// A credential value. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Supplies credentials for configured models.
pub trait CredentialResolver: Send + Sync {
    fn resolve_credential(&self, model: &ModelSpec) -> Option<Secret>;
}

/// Fixed credentials, keyed by model id. Useful for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    entries: std::collections::HashMap<String, Secret>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.entries.insert(model_id.into(), Secret::new(secret));
        self
    }
}

impl CredentialResolver for StaticCredentials {
    fn resolve_credential(&self, model: &ModelSpec) -> Option<Secret> {
        self.entries.get(&model.id).cloned()
    }
}
