//! Tag-suggestion backends.
//!
//! One capability ("propose tags for note content") behind the [`TagBackend`]
//! trait, with two implementations selected at startup: a local Ollama
//! endpoint and a remote Anthropic-style API. Callers never branch on which
//! one is active.

mod local;
mod remote;

pub use local::{LocalBackend, LocalBackendBuilder};
pub use remote::{RemoteBackend, RemoteBackendBuilder};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::{BackendKind, Config};

/// Errors that can occur when requesting tag suggestions.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network-level failures: connection refused, DNS, timeout.
    #[error("Backend unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    /// Non-success HTTP status from the backend.
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// The backend answered, but no tag list could be extracted.
    #[error("Invalid backend response: {message}")]
    InvalidResponse { message: String },

    /// Invalid base URL configuration.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The remote backend was selected without an API key.
    #[error("API key is required for the remote backend")]
    MissingApiKey,
}

/// One backend call's result: the proposed tags plus the token count the
/// backend reported for the request (0 when unreported).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSuggestion {
    pub tags: Vec<String>,
    pub tokens_used: u64,
}

/// Capability trait for tag-suggestion providers.
///
/// Object-safe so the processor can hold `Arc<dyn TagBackend>` and tests can
/// substitute mock implementations.
pub trait TagBackend: Send + Sync {
    /// Proposes tags for the given note content.
    fn suggest_tags(&self, content: &str) -> Result<TagSuggestion, BackendError>;
}

/// Builds the backend selected by the configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn TagBackend>, BackendError> {
    match config.backend {
        BackendKind::Local => {
            let mut builder = LocalBackendBuilder::new().timeout(config.timeout);
            if let Some(model) = &config.model {
                builder = builder.model(model);
            }
            Ok(Arc::new(builder.build()?))
        }
        BackendKind::Remote => {
            let mut builder = RemoteBackendBuilder::new().timeout(config.timeout);
            if let Some(key) = &config.api_key {
                builder = builder.api_key(key);
            }
            if let Some(model) = &config.model {
                builder = builder.model(model);
            }
            Ok(Arc::new(builder.build()?))
        }
    }
}

/// Prompt sent to both backends. Asks for exactly nine `#`-prefixed tags so
/// the merged list stays within the ten-tag ceiling for untagged notes.
const PROMPT_TEMPLATE: &str = r#"You are an assistant that generates exactly 9 relevant topical tags for a markdown note.

Analyze the note content below, then respond with exactly 9 distinct tags:
1. Identify the main topics, themes, and key concepts present in the text.
2. Make the tags comprehensive, covering different aspects of the content rather than a single theme.
3. Each tag is a single word or a short hyphenated phrase.
4. Prefix each tag with the '#' symbol and separate tags with a single space.
5. Do not tag the note-taking software itself; focus on the content.
6. Respond with only the 9 tags, no explanations or other text.

Your output should look like this:
#tag1 #tag2 #tag3 #tag4 #tag5 #tag6 #tag7 #tag8 #tag9

NOTE CONTENT:
{content}

TAGS:"#;

/// Renders the shared prompt with the note content inserted.
pub(crate) fn render_prompt(content: &str) -> String {
    PROMPT_TEMPLATE.replace("{content}", content)
}

/// Extracts a tag list from free-form model output.
///
/// Splits on whitespace, strips `#` prefixes and stray punctuation, drops
/// empty tokens, and deduplicates case-insensitively while preserving
/// order. Returns an empty list when the response contains no usable tags.
pub(crate) fn extract_tags(response: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    response
        .split_whitespace()
        .map(|token| {
            token
                .trim_matches(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
                .to_string()
        })
        .filter(|t| !t.is_empty() && t.chars().any(char::is_alphanumeric))
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

/// Retries an operation with exponential backoff.
///
/// Up to 3 retries with delays of 1s, 2s, and 4s, only on transient errors
/// (network failures and HTTP 5xx). Client errors and invalid responses
/// propagate immediately so the caller's retry budget handles them.
pub(crate) fn retry_with_backoff<F, T>(mut f: F) -> Result<T, BackendError>
where
    F: FnMut() -> Result<T, BackendError>,
{
    const DELAYS: [u64; 3] = [1, 2, 4]; // seconds

    let mut last_error = match f() {
        Ok(result) => return Ok(result),
        Err(e) => {
            if !should_retry(&e) {
                return Err(e);
            }
            e
        }
    };

    for &delay_secs in &DELAYS {
        thread::sleep(Duration::from_secs(delay_secs));

        match f() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Transient errors (network, HTTP 5xx) are worth re-sending; everything
/// else is not.
fn should_retry(error: &BackendError) -> bool {
    match error {
        BackendError::Unavailable(_) => true,
        BackendError::Http { status } => (500..600).contains(status),
        BackendError::InvalidResponse { .. } => false,
        BackendError::InvalidUrl(_) => false,
        BackendError::MissingApiKey => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_tags_from_clean_hash_list() {
        let tags = extract_tags("#rust #async #tokio");
        assert_eq!(tags, vec!["rust", "async", "tokio"]);
    }

    #[test]
    fn extract_tags_strips_punctuation_and_bare_tokens() {
        let tags = extract_tags("#rust, async. #web-dev!");
        assert_eq!(tags, vec!["rust", "async", "web-dev"]);
    }

    #[test]
    fn extract_tags_deduplicates_case_insensitively() {
        let tags = extract_tags("#Rust #rust #RUST #other");
        assert_eq!(tags, vec!["Rust", "other"]);
    }

    #[test]
    fn extract_tags_from_chatty_response() {
        let response = "Here are the tags:\n#project #idea #draft\nHope this helps!";
        let tags = extract_tags(response);
        assert!(tags.contains(&"project".to_string()));
        assert!(tags.contains(&"idea".to_string()));
        assert!(tags.contains(&"draft".to_string()));
    }

    #[test]
    fn extract_tags_empty_for_contentless_response() {
        assert!(extract_tags("").is_empty());
        assert!(extract_tags("### --- ###").is_empty());
    }

    #[test]
    fn render_prompt_embeds_note_content() {
        let prompt = render_prompt("Learning Rust ownership");
        assert!(prompt.contains("Learning Rust ownership"));
        assert!(prompt.contains("exactly 9"));
    }

    #[test]
    fn retry_does_not_occur_on_invalid_response() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let attempts = AtomicUsize::new(0);
        let result: Result<(), BackendError> = retry_with_backoff(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::InvalidResponse {
                message: "garbage".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_does_not_occur_on_http_4xx() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let attempts = AtomicUsize::new(0);
        let result: Result<(), BackendError> = retry_with_backoff(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Http { status: 404 })
        });

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_occurs_on_http_5xx() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let attempts = AtomicUsize::new(0);
        let result = retry_with_backoff(|| {
            if attempts.fetch_add(1, Ordering::SeqCst) < 1 {
                Err(BackendError::Http { status: 500 })
            } else {
                Ok("success")
            }
        });

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn trait_can_be_implemented_by_mock_struct() {
        struct MockBackend;

        impl TagBackend for MockBackend {
            fn suggest_tags(&self, _content: &str) -> Result<TagSuggestion, BackendError> {
                Ok(TagSuggestion {
                    tags: vec!["mock".to_string()],
                    tokens_used: 0,
                })
            }
        }

        let backend: Arc<dyn TagBackend> = Arc::new(MockBackend);
        let suggestion = backend.suggest_tags("anything").unwrap();
        assert_eq!(suggestion.tags, vec!["mock"]);
    }
}
