pub mod backend;
pub mod config;
pub mod frontmatter;
pub mod processor;
pub mod scanner;
pub mod stats;

pub use backend::{
    BackendError, LocalBackend, LocalBackendBuilder, RemoteBackend, RemoteBackendBuilder,
    TagBackend, TagSuggestion,
};
pub use config::{BackendKind, Config, ConfigError, ConfigOverrides};
pub use processor::{FileProcessor, MAX_TAGS, merge_tags};
pub use stats::{OutcomeKind, ProcessingOutcome, RunStatistics, StatsAggregator};
