//! Local tag backend: an Ollama-compatible `/api/generate` endpoint.

use std::time::Duration;

use super::{BackendError, TagBackend, TagSuggestion, extract_tags, render_prompt, retry_with_backoff};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama2";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for [`LocalBackend`] instances.
///
/// Unset values fall back to environment variables (`OLLAMA_HOST`,
/// `OLLAMA_MODEL`) and then to defaults.
#[derive(Debug, Default)]
pub struct LocalBackendBuilder {
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl LocalBackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL (e.g. "http://localhost:11434").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model name (e.g. "llama2" or "qwen3:8b").
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the backend, validating the base URL.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidUrl` for an unparsable base URL and
    /// `BackendError::Unavailable` if the HTTP client cannot be built.
    pub fn build(self) -> Result<LocalBackend, BackendError> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var("OLLAMA_HOST").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = self
            .model
            .or_else(|| std::env::var("OLLAMA_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        reqwest::Url::parse(&base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(BackendError::Unavailable)?;

        Ok(LocalBackend {
            client,
            base_url,
            model,
        })
    }
}

/// Tag backend talking to a local Ollama server.
///
/// Transient failures (network errors, HTTP 5xx) are re-sent with
/// exponential backoff before surfacing as `Unavailable`.
pub struct LocalBackend {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl LocalBackend {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TagBackend for LocalBackend {
    fn suggest_tags(&self, content: &str) -> Result<TagSuggestion, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let request_body = serde_json::json!({
            "model": self.model,
            "prompt": render_prompt(content),
            "stream": false
        });

        retry_with_backoff(|| {
            let response = self
                .client
                .post(&url)
                .json(&request_body)
                .send()
                .map_err(BackendError::Unavailable)?;

            let status = response.status();
            if !status.is_success() {
                return Err(BackendError::Http {
                    status: status.as_u16(),
                });
            }

            let json: serde_json::Value =
                response.json().map_err(|e| BackendError::InvalidResponse {
                    message: format!("body is not JSON: {e}"),
                })?;

            let text = json
                .get("response")
                .and_then(|v| v.as_str())
                .ok_or_else(|| BackendError::InvalidResponse {
                    message: "missing 'response' field".to_string(),
                })?;

            let tags = extract_tags(text);
            if tags.is_empty() {
                return Err(BackendError::InvalidResponse {
                    message: format!("no tags in model output: {text:?}"),
                });
            }

            // prompt_eval_count + eval_count is Ollama's full token usage
            let tokens_used = json
                .get("prompt_eval_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
                + json.get("eval_count").and_then(|v| v.as_u64()).unwrap_or(0);

            Ok(TagSuggestion { tags, tokens_used })
        })
    }
}
