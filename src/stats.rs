//! Per-file outcomes and run-level statistics.
//!
//! The aggregator is the only shared mutable state of a run: it receives one
//! [`ProcessingOutcome`] after each file completes and produces an immutable
//! [`RunStatistics`] snapshot at the end.

use std::time::{Duration, Instant};

use crate::config::BackendKind;

// ANSI color codes for terminal output
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RESET: &str = "\x1b[0m";

/// Estimated remote API cost per 1K tokens, in USD.
const COST_PER_1K_TOKENS: f64 = 0.08;

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// New tags were written to the file.
    Tagged,
    /// The file already had a full tag list; no backend call was made.
    SkippedAlreadyTagged,
    /// The backend never produced an acceptable tag list within the retry
    /// limit; the file was left unmodified.
    FailedRetryExhausted,
    /// The backend was unreachable or the file could not be read/written.
    Error,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tagged => write!(f, "tagged"),
            Self::SkippedAlreadyTagged => write!(f, "skipped-already-tagged"),
            Self::FailedRetryExhausted => write!(f, "failed-retry-exhausted"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Per-file processing result handed to the aggregator.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub kind: OutcomeKind,
    /// Wall time spent on this file, including retries.
    pub elapsed: Duration,
    /// Backend requests issued for this file.
    pub requests: u64,
    /// Tokens the backend reported for those requests.
    pub tokens: u64,
    /// Tags written on `Tagged`; empty otherwise.
    pub written_tags: Vec<String>,
    /// Failure detail on `Error` / `FailedRetryExhausted`.
    pub message: Option<String>,
}

/// Accumulates outcomes during a run.
///
/// Created at run start; `record` is called once per scanned file, strictly
/// after that file completes. There are no concurrent writers.
#[derive(Debug)]
pub struct StatsAggregator {
    started: Instant,
    tagged: u64,
    skipped_already_tagged: u64,
    failed_retry_exhausted: u64,
    errors: u64,
    backend_requests: u64,
    total_tokens: u64,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            tagged: 0,
            skipped_already_tagged: 0,
            failed_retry_exhausted: 0,
            errors: 0,
            backend_requests: 0,
            total_tokens: 0,
        }
    }

    /// Records one file's outcome.
    pub fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome.kind {
            OutcomeKind::Tagged => self.tagged += 1,
            OutcomeKind::SkippedAlreadyTagged => self.skipped_already_tagged += 1,
            OutcomeKind::FailedRetryExhausted => self.failed_retry_exhausted += 1,
            OutcomeKind::Error => self.errors += 1,
        }
        self.backend_requests += outcome.requests;
        self.total_tokens += outcome.tokens;
    }

    /// Finalizes the run into an immutable snapshot.
    pub fn finalize(self) -> RunStatistics {
        RunStatistics {
            total_files: self.tagged
                + self.skipped_already_tagged
                + self.failed_retry_exhausted
                + self.errors,
            tagged: self.tagged,
            skipped_already_tagged: self.skipped_already_tagged,
            failed_retry_exhausted: self.failed_retry_exhausted,
            errors: self.errors,
            backend_requests: self.backend_requests,
            total_tokens: self.total_tokens,
            total_elapsed: self.started.elapsed(),
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable end-of-run statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatistics {
    pub total_files: u64,
    pub tagged: u64,
    pub skipped_already_tagged: u64,
    pub failed_retry_exhausted: u64,
    pub errors: u64,
    pub backend_requests: u64,
    pub total_tokens: u64,
    pub total_elapsed: Duration,
}

impl RunStatistics {
    /// Average wall time per scanned file; zero when nothing was scanned.
    pub fn average_per_file(&self) -> Duration {
        if self.total_files == 0 {
            Duration::ZERO
        } else {
            self.total_elapsed / self.total_files as u32
        }
    }

    /// Estimated remote API cost for the run, in USD.
    pub fn estimated_cost_usd(&self) -> f64 {
        (self.total_tokens as f64 / 1000.0) * COST_PER_1K_TOKENS
    }
}

/// Prints the final report to stdout.
pub fn print_report(stats: &RunStatistics, backend: BackendKind) {
    println!("\n{CYAN}{BOLD}=== Run Statistics ==={RESET}");
    println!("Total files processed: {}", stats.total_files);
    println!("{GREEN}Files tagged: {}{RESET}", stats.tagged);
    println!(
        "{DIM}Files skipped (already tagged): {}{RESET}",
        stats.skipped_already_tagged
    );
    println!(
        "{YELLOW}Files failed (retries exhausted): {}{RESET}",
        stats.failed_retry_exhausted
    );
    println!("{RED}Files with errors: {}{RESET}", stats.errors);

    println!("\n{CYAN}Performance:{RESET}");
    println!("Total run time: {:.2} seconds", stats.total_elapsed.as_secs_f64());
    println!(
        "Average time per file: {:.2} seconds",
        stats.average_per_file().as_secs_f64()
    );
    println!("Backend requests: {}", stats.backend_requests);
    println!("Tokens used: {}", stats.total_tokens);

    match backend {
        BackendKind::Remote => {
            println!(
                "\n{YELLOW}Estimated API cost: ${:.2}{RESET}",
                stats.estimated_cost_usd()
            );
        }
        BackendKind::Local => {
            println!("\n{YELLOW}Using local model (no API cost){RESET}");
        }
    }
}
