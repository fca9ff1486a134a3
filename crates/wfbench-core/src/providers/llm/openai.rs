//! OpenAI-compatible chat-completions client.
//!
//! This is the only place that interprets HTTP status codes. Anything above
//! it sees [`InvokeError`] variants.

use crate::config::{ModelSpec, Secret};
use crate::errors::InvokeError;
use crate::providers::llm::LlmClient;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const USER_AGENT_VALUE: &str = concat!("wfbench/", env!("CARGO_PKG_VERSION"));

pub struct OpenAIClient {
    id: String,
    model: String,
    endpoint: String,
    api_key: Secret,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(spec: &ModelSpec, api_key: Secret) -> Result<Self, InvokeError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|e| InvokeError::InvalidRequest {
                model: spec.id.clone(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let base = spec
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            id: spec.id.clone(),
            model: spec.provider_model().to_string(),
            endpoint: format!("{}/chat/completions", base),
            api_key,
            temperature: spec.temperature,
            max_tokens: spec.max_tokens,
            client,
        })
    }

    fn map_status(&self, status: u16, retry_after: Option<Duration>, body: String) -> InvokeError {
        let model = self.id.clone();
        match status {
            401 | 403 => InvokeError::Auth {
                model,
                message: truncate(&body),
            },
            429 => InvokeError::RateLimited { model, retry_after },
            400 | 404 | 405 | 413 | 415 | 422 => InvokeError::InvalidRequest {
                model,
                message: format!("status {}: {}", status, truncate(&body)),
            },
            _ => InvokeError::Provider {
                model,
                status: Some(status),
                message: truncate(&body),
            },
        }
    }

    fn map_transport(&self, err: reqwest::Error) -> InvokeError {
        if err.is_timeout() {
            InvokeError::Timeout {
                model: self.id.clone(),
                elapsed: Duration::ZERO,
            }
        } else {
            InvokeError::Provider {
                model: self.id.clone(),
                status: None,
                message: format!("network error: {}", err),
            }
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, prompt: &str, expects_json: bool) -> Result<String, InvokeError> {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if expects_json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        debug!(model = %self.id, endpoint = %self.endpoint, "sending chat completion");

        let mut req = self.client.post(&self.endpoint).json(&body);
        // Local endpoints run without a key.
        if !self.api_key.expose().is_empty() {
            req = req.header(AUTHORIZATION, format!("Bearer {}", self.api_key.expose()));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = resp.text().await.unwrap_or_default();
            return Err(self.map_status(status.as_u16(), retry_after, text));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| InvokeError::Provider {
            model: self.id.clone(),
            status: Some(status.as_u16()),
            message: format!("unreadable response body: {}", e),
        })?;

        // Parse choices[0].message.content
        match json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
        {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(InvokeError::EmptyResponse {
                model: self.id.clone(),
            }),
        }
    }

    fn model_id(&self) -> &str {
        &self.id
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    let body = body.trim();
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
