//! Per-file orchestration: parse, decide eligibility, acquire tags through
//! the retry loop, and write the updated tag list back.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::{BackendError, TagBackend};
use crate::frontmatter;
use crate::stats::{OutcomeKind, ProcessingOutcome};

/// Maximum number of tags a note may carry after write-back.
pub const MAX_TAGS: usize = 10;

/// Processes one file at a time against a tag backend.
///
/// The processor never aborts a run: every failure is folded into the
/// returned [`ProcessingOutcome`] so the caller's scan loop always advances.
pub struct FileProcessor {
    backend: Arc<dyn TagBackend>,
    retry_limit: u32,
}

/// Internal result of the acquire-and-validate loop for one file.
enum LoopResult {
    /// Backend produced a merged tag list within the ceiling.
    Accepted(Vec<String>),
    /// Every attempt exceeded the ceiling or was unparsable.
    Exhausted,
    /// The backend failed in a non-retryable way.
    Failed(BackendError),
}

impl FileProcessor {
    pub fn new(backend: Arc<dyn TagBackend>, retry_limit: u32) -> Self {
        Self {
            backend,
            retry_limit,
        }
    }

    /// Processes a single markdown file.
    ///
    /// Files that already carry [`MAX_TAGS`] or more tags are skipped
    /// without a backend call and left unmodified. Otherwise the backend is
    /// invoked up to `retry_limit` times until the merged tag list fits the
    /// ceiling; on acceptance the file's tag entry is rewritten in place.
    pub fn process(&self, path: &Path) -> ProcessingOutcome {
        let started = Instant::now();
        let mut requests = 0u64;
        let mut tokens = 0u64;

        let (kind, written_tags, message) = self.process_inner(path, &mut requests, &mut tokens);

        ProcessingOutcome {
            kind,
            elapsed: started.elapsed(),
            requests,
            tokens,
            written_tags,
            message,
        }
    }

    fn process_inner(
        &self,
        path: &Path,
        requests: &mut u64,
        tokens: &mut u64,
    ) -> (OutcomeKind, Vec<String>, Option<String>) {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                return (
                    OutcomeKind::Error,
                    Vec::new(),
                    Some(format!("failed to read file: {e}")),
                );
            }
        };

        let metadata = frontmatter::parse(&content);
        if metadata.tags.len() >= MAX_TAGS {
            return (OutcomeKind::SkippedAlreadyTagged, Vec::new(), None);
        }

        match self.acquire_tags(&content, &metadata.tags, requests, tokens) {
            LoopResult::Accepted(merged) => {
                let updated = frontmatter::write_tags(&content, &merged);
                if let Err(e) = std::fs::write(path, updated) {
                    return (
                        OutcomeKind::Error,
                        Vec::new(),
                        Some(format!("failed to write file: {e}")),
                    );
                }
                (OutcomeKind::Tagged, merged, None)
            }
            LoopResult::Exhausted => (
                OutcomeKind::FailedRetryExhausted,
                Vec::new(),
                Some(format!(
                    "no acceptable tag list within {} attempts",
                    self.retry_limit
                )),
            ),
            LoopResult::Failed(e) => (OutcomeKind::Error, Vec::new(), Some(e.to_string())),
        }
    }

    /// Start → Requesting → {Accepted | Retrying | Exhausted}.
    ///
    /// An over-count merge and an invalid response both consume one attempt
    /// of the retry budget; each retry re-issues the full request. Any other
    /// backend failure aborts the loop.
    fn acquire_tags(
        &self,
        content: &str,
        existing: &[String],
        requests: &mut u64,
        tokens: &mut u64,
    ) -> LoopResult {
        for _attempt in 0..self.retry_limit {
            *requests += 1;
            match self.backend.suggest_tags(content) {
                Ok(suggestion) => {
                    *tokens += suggestion.tokens_used;
                    let merged = merge_tags(existing, &suggestion.tags);
                    if merged.len() <= MAX_TAGS {
                        return LoopResult::Accepted(merged);
                    }
                    // over-count: retry with a fresh request
                }
                Err(BackendError::InvalidResponse { .. }) => {
                    // unparsable response counts toward the retry budget
                }
                Err(e) => return LoopResult::Failed(e),
            }
        }
        LoopResult::Exhausted
    }
}

/// Order-preserving union: existing tags first in their original order,
/// then novel suggestions in response order. Duplicates are detected
/// case-insensitively.
pub fn merge_tags(existing: &[String], suggested: &[String]) -> Vec<String> {
    let mut seen: std::collections::HashSet<String> =
        existing.iter().map(|t| t.to_lowercase()).collect();
    let mut merged = existing.to_vec();
    for tag in suggested {
        if seen.insert(tag.to_lowercase()) {
            merged.push(tag.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TagSuggestion;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock backend returning a fixed tag list.
    struct MockBackend {
        tags: Vec<String>,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn new(tags: &[&str]) -> Self {
            Self {
                tags: tags.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TagBackend for MockBackend {
        fn suggest_tags(&self, _content: &str) -> Result<TagSuggestion, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TagSuggestion {
                tags: self.tags.clone(),
                tokens_used: 42,
            })
        }
    }

    /// Mock backend that always fails with the given constructor.
    struct FailingBackend<F: Fn() -> BackendError + Send + Sync> {
        make_error: F,
        calls: AtomicUsize,
    }

    impl<F: Fn() -> BackendError + Send + Sync> TagBackend for FailingBackend<F> {
        fn suggest_tags(&self, _content: &str) -> Result<TagSuggestion, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.make_error)())
        }
    }

    fn temp_note(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".md")
            .tempfile()
            .expect("create temp note");
        file.write_all(content.as_bytes()).expect("write temp note");
        file
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merge_preserves_existing_order_and_appends_novel() {
        let merged = merge_tags(&strings(&["a", "b"]), &strings(&["b", "c"]));
        assert_eq!(merged, strings(&["a", "b", "c"]));
    }

    #[test]
    fn merge_deduplicates_case_insensitively() {
        let merged = merge_tags(&strings(&["Rust"]), &strings(&["rust", "async"]));
        assert_eq!(merged, strings(&["Rust", "async"]));
    }

    #[test]
    fn untagged_note_gets_suggested_tags_written() {
        let backend = Arc::new(MockBackend::new(&["project", "idea", "draft"]));
        let processor = FileProcessor::new(backend.clone(), 3);
        let note = temp_note("# Meeting notes\n\nDiscussed roadmap.\n");

        let outcome = processor.process(note.path());

        assert_eq!(outcome.kind, OutcomeKind::Tagged);
        assert_eq!(outcome.written_tags, strings(&["project", "idea", "draft"]));
        assert_eq!(outcome.requests, 1);
        assert_eq!(outcome.tokens, 42);
        assert_eq!(backend.calls(), 1);

        let updated = std::fs::read_to_string(note.path()).unwrap();
        assert!(updated.contains("Tags: #project #idea #draft"));
    }

    #[test]
    fn fully_tagged_note_skips_backend_and_stays_unmodified() {
        let backend = Arc::new(MockBackend::new(&["unused"]));
        let processor = FileProcessor::new(backend.clone(), 3);
        let content = "Tags: #t1 #t2 #t3 #t4 #t5 #t6 #t7 #t8 #t9 #t10\n\nBody.\n";
        let note = temp_note(content);

        let outcome = processor.process(note.path());

        assert_eq!(outcome.kind, OutcomeKind::SkippedAlreadyTagged);
        assert_eq!(outcome.requests, 0);
        assert_eq!(backend.calls(), 0);
        assert_eq!(std::fs::read_to_string(note.path()).unwrap(), content);
    }

    #[test]
    fn acceptable_count_terminates_on_first_attempt() {
        let backend = Arc::new(MockBackend::new(&["one", "two"]));
        let processor = FileProcessor::new(backend.clone(), 3);
        let note = temp_note("Short note.\n");

        let outcome = processor.process(note.path());

        assert_eq!(outcome.kind, OutcomeKind::Tagged);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn persistent_overcount_exhausts_exactly_retry_limit_attempts() {
        let eleven: Vec<&str> = vec![
            "t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8", "t9", "t10", "t11",
        ];
        let backend = Arc::new(MockBackend::new(&eleven));
        let processor = FileProcessor::new(backend.clone(), 3);
        let content = "Untagged body.\n";
        let note = temp_note(content);

        let outcome = processor.process(note.path());

        assert_eq!(outcome.kind, OutcomeKind::FailedRetryExhausted);
        assert_eq!(backend.calls(), 3);
        assert_eq!(outcome.requests, 3);
        // file left unmodified
        assert_eq!(std::fs::read_to_string(note.path()).unwrap(), content);
    }

    #[test]
    fn invalid_response_consumes_retry_budget() {
        let backend = Arc::new(FailingBackend {
            make_error: || BackendError::InvalidResponse {
                message: "garbage".to_string(),
            },
            calls: AtomicUsize::new(0),
        });
        let processor = FileProcessor::new(backend.clone(), 2);
        let note = temp_note("Body.\n");

        let outcome = processor.process(note.path());

        assert_eq!(outcome.kind, OutcomeKind::FailedRetryExhausted);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unavailable_backend_aborts_as_error_without_retry() {
        let backend = Arc::new(FailingBackend {
            make_error: || BackendError::Http { status: 503 },
            calls: AtomicUsize::new(0),
        });
        let processor = FileProcessor::new(backend.clone(), 3);
        let content = "Body.\n";
        let note = temp_note(content);

        let outcome = processor.process(note.path());

        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(outcome.message.is_some());
        assert_eq!(std::fs::read_to_string(note.path()).unwrap(), content);
    }

    #[test]
    fn suggestions_merge_with_existing_partial_tags() {
        let backend = Arc::new(MockBackend::new(&["b", "c"]));
        let processor = FileProcessor::new(backend, 3);
        let note = temp_note("Tags: #a #b\n\nBody.\n");

        let outcome = processor.process(note.path());

        assert_eq!(outcome.kind, OutcomeKind::Tagged);
        assert_eq!(outcome.written_tags, strings(&["a", "b", "c"]));
        let updated = std::fs::read_to_string(note.path()).unwrap();
        assert!(updated.contains("Tags: #a #b #c"));
    }

    #[test]
    fn missing_file_reports_error_outcome() {
        let backend = Arc::new(MockBackend::new(&["x"]));
        let processor = FileProcessor::new(backend, 3);

        let outcome = processor.process(Path::new("/nonexistent/note.md"));

        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert_eq!(outcome.requests, 0);
    }
}
