//! Error taxonomy.
//!
//! Only [`RunError`] is fatal to a run. Everything a model or judge can do wrong
//! is an [`InvokeError`] and ends up recorded on the pair it happened to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Stable, serializable classification of a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AuthError,
    RateLimited,
    ProviderError,
    Timeout,
    EmptyResponse,
    InvalidRequest,
    UnknownModel,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::AuthError => "auth_error",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ProviderError => "provider_error",
            FailureKind::Timeout => "timeout",
            FailureKind::EmptyResponse => "empty_response",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::UnknownModel => "unknown_model",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one logical model invocation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvokeError {
    /// Credential rejected by the provider.
    #[error("authentication failed for model '{model}': {message}")]
    Auth { model: String, message: String },

    /// Provider signalled rate limiting.
    #[error("rate limited by provider for model '{model}' (retry after {retry_after:?})")]
    RateLimited {
        model: String,
        retry_after: Option<Duration>,
    },

    /// 5xx, unexpected status, or transport failure.
    #[error("provider error for model '{model}' (status {status:?}): {message}")]
    Provider {
        model: String,
        status: Option<u16>,
        message: String,
    },

    #[error("request to model '{model}' timed out after {elapsed:?}")]
    Timeout { model: String, elapsed: Duration },

    #[error("model '{model}' returned an empty response")]
    EmptyResponse { model: String },

    /// Malformed request or a model id the provider does not serve.
    #[error("invalid request for model '{model}': {message}")]
    InvalidRequest { model: String, message: String },

    /// No client is registered under this model id.
    #[error("no client configured for model '{model}'")]
    UnknownModel { model: String },
}

impl InvokeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Auth { .. } => FailureKind::AuthError,
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Provider { .. } => FailureKind::ProviderError,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::EmptyResponse { .. } => FailureKind::EmptyResponse,
            Self::InvalidRequest { .. } => FailureKind::InvalidRequest,
            Self::UnknownModel { .. } => FailureKind::UnknownModel,
        }
    }

    /// Whether another attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Provider { .. }
                | Self::Timeout { .. }
                | Self::EmptyResponse { .. }
        )
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Auth { model, .. }
            | Self::RateLimited { model, .. }
            | Self::Provider { model, .. }
            | Self::Timeout { model, .. }
            | Self::EmptyResponse { model }
            | Self::InvalidRequest { model, .. }
            | Self::UnknownModel { model } => model,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Corpus could not be read or violates a case invariant.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("corpus root not found: {}", path.display())]
    RootNotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metadata in {}: {message}", path.display())]
    Metadata { path: PathBuf, message: String },

    #[error("case {language}/{case_id}: missing {file} file")]
    MissingFile {
        language: String,
        case_id: String,
        file: &'static str,
    },

    #[error("case {language}/{case_id}: more than one {file} file")]
    AmbiguousFile {
        language: String,
        case_id: String,
        file: &'static str,
    },

    #[error("case {language}/{case_id}: {message}")]
    InvalidCase {
        language: String,
        case_id: String,
        message: String,
    },
}

/// Configuration is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Invalid(String),

    #[error("model '{0}' is not defined in the config")]
    UndefinedModel(String),

    #[error("no credential could be resolved for any configured model")]
    NoCredentials,

    #[error("no credential could be resolved for judge model '{0}'")]
    JudgeUnavailable(String),
}

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(status: u16) -> InvokeError {
        InvokeError::Provider {
            model: "m".into(),
            status: Some(status),
            message: "boom".into(),
        }
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(provider(503).is_retryable());
        assert!(InvokeError::EmptyResponse { model: "m".into() }.is_retryable());
        assert!(InvokeError::Timeout {
            model: "m".into(),
            elapsed: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(InvokeError::RateLimited {
            model: "m".into(),
            retry_after: None
        }
        .is_retryable());
    }

    #[test]
    fn permanent_failures_are_not_retryable() {
        assert!(!InvokeError::Auth {
            model: "m".into(),
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!InvokeError::InvalidRequest {
            model: "m".into(),
            message: "unsupported model".into()
        }
        .is_retryable());
        assert!(!InvokeError::UnknownModel { model: "m".into() }.is_retryable());
    }

    #[test]
    fn failure_kind_serializes_snake_case() {
        let s = serde_json::to_string(&FailureKind::AuthError).unwrap();
        assert_eq!(s, "\"auth_error\"");
        assert_eq!(provider(500).kind().as_str(), "provider_error");
    }
}
