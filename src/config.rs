//! Run configuration, resolved once at startup.
//!
//! Values come from CLI flags with environment-variable fallbacks; the
//! resulting [`Config`] is passed explicitly to each component so the
//! scanner, processor, and backends can be tested in isolation.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default retry limit for the per-file tag acquisition loop.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default backend request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Directory names excluded from descent when none are configured.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "zTemplates",
    "cheat-sheets-main",
    "zz_Attachments",
    "00 Monthly Tasks",
    "BMO",
    "zz_Archive",
];

/// Which tag-suggestion backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Local model endpoint (Ollama).
    Local,
    /// Remote API endpoint.
    Remote,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(ConfigError::InvalidBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Configuration errors are the only fatal startup errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("root directory is required (--root or NOTETAG_ROOT)")]
    MissingRoot,

    #[error("root is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    #[error("unknown backend '{0}' (expected 'local' or 'remote')")]
    InvalidBackend(String),

    #[error("an API key is required for the remote backend (--api-key or NOTETAG_API_KEY)")]
    MissingApiKey,

    #[error("invalid retry limit '{0}'")]
    InvalidRetryLimit(String),
}

/// Unresolved options as collected from the command line. `None` means
/// "not given"; resolution applies env fallbacks and defaults.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub backend: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub retry_limit: Option<u32>,
    pub excluded_dirs: Vec<String>,
    pub timeout_secs: Option<u64>,
}

/// Resolved, validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub backend: BackendKind,
    /// Present iff the remote backend is selected.
    pub api_key: Option<String>,
    /// Model override; each backend supplies its own default.
    pub model: Option<String>,
    pub retry_limit: u32,
    pub excluded_dirs: HashSet<String>,
    pub timeout: Duration,
}

impl Config {
    /// Resolves CLI overrides against the environment and validates the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the root directory is missing or not
    /// a directory, the backend name is unknown, the remote backend lacks
    /// an API key, or a numeric env value is unparsable.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let root = overrides
            .root
            .or_else(|| std::env::var("NOTETAG_ROOT").ok().map(PathBuf::from))
            .ok_or(ConfigError::MissingRoot)?;
        if !root.is_dir() {
            return Err(ConfigError::RootNotADirectory(root));
        }

        let backend = overrides
            .backend
            .or_else(|| std::env::var("NOTETAG_BACKEND").ok())
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(BackendKind::Local);

        let api_key = overrides
            .api_key
            .or_else(|| std::env::var("NOTETAG_API_KEY").ok())
            .filter(|k| !k.is_empty());
        if backend == BackendKind::Remote && api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }

        let retry_limit = match overrides.retry_limit {
            Some(limit) => limit,
            None => match std::env::var("NOTETAG_RETRY_LIMIT") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|_| ConfigError::InvalidRetryLimit(raw))?,
                Err(_) => DEFAULT_RETRY_LIMIT,
            },
        };

        let excluded_dirs = if overrides.excluded_dirs.is_empty() {
            DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect()
        } else {
            overrides.excluded_dirs.into_iter().collect()
        };

        let timeout =
            Duration::from_secs(overrides.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

        Ok(Self {
            root,
            backend,
            api_key,
            model: overrides.model,
            retry_limit,
            excluded_dirs,
            timeout,
        })
    }
}
