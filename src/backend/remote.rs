//! Remote tag backend: an Anthropic-style messages API.

use std::time::Duration;

use super::{BackendError, TagBackend, TagSuggestion, extract_tags, render_prompt};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;

/// Builder for [`RemoteBackend`] instances.
///
/// Unset values fall back to environment variables (`NOTETAG_API_KEY`,
/// `NOTETAG_REMOTE_URL`, `NOTETAG_REMOTE_MODEL`) and then to defaults.
/// An API key is required.
#[derive(Debug, Default)]
pub struct RemoteBackendBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl RemoteBackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the backend.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::MissingApiKey` when no key was provided (via
    /// builder or `NOTETAG_API_KEY`), `BackendError::InvalidUrl` for an
    /// unparsable base URL, and `BackendError::Unavailable` if the HTTP
    /// client cannot be built.
    pub fn build(self) -> Result<RemoteBackend, BackendError> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("NOTETAG_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or(BackendError::MissingApiKey)?;

        let base_url = self
            .base_url
            .or_else(|| std::env::var("NOTETAG_REMOTE_URL").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = self
            .model
            .or_else(|| std::env::var("NOTETAG_REMOTE_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        reqwest::Url::parse(&base_url)
            .map_err(|e| BackendError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(BackendError::Unavailable)?;

        Ok(RemoteBackend {
            client,
            base_url,
            api_key,
            model,
        })
    }
}

/// Tag backend talking to a remote messages API.
pub struct RemoteBackend {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl RemoteBackend {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TagBackend for RemoteBackend {
    fn suggest_tags(&self, content: &str) -> Result<TagSuggestion, BackendError> {
        let url = format!("{}/v1/messages", self.base_url);
        let request_body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [
                {"role": "user", "content": render_prompt(content)}
            ]
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| BackendError::InvalidResponse {
                message: "missing 'content[0].text' field".to_string(),
            })?;

        let tags = extract_tags(text);
        if tags.is_empty() {
            return Err(BackendError::InvalidResponse {
                message: format!("no tags in model output: {text:?}"),
            });
        }

        let usage = json.get("usage");
        let tokens_used = usage
            .and_then(|u| u.get("input_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + usage
                .and_then(|u| u.get("output_tokens"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);

        Ok(TagSuggestion { tags, tokens_used })
    }
}
