use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use notetag::stats::print_report;
use notetag::{
    Config, ConfigError, ConfigOverrides, FileProcessor, OutcomeKind, StatsAggregator, backend,
    scanner,
};

/// notetag - generate frontmatter tags for markdown note vaults
#[derive(Parser)]
#[command(name = "notetag")]
#[command(about = "Scans a markdown vault and tags under-tagged notes with an LLM")]
#[command(version)]
struct Cli {
    /// Root directory of the note vault (env: NOTETAG_ROOT)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Tag backend: 'local' (Ollama) or 'remote' (env: NOTETAG_BACKEND)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<String>,

    /// API key for the remote backend (env: NOTETAG_API_KEY)
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Model name; each backend has its own default (env: OLLAMA_MODEL)
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Backend attempts per file before giving up (env: NOTETAG_RETRY_LIMIT)
    #[arg(long, value_name = "N")]
    retry_limit: Option<u32>,

    /// Directory name to skip during the scan; repeatable. Replaces the
    /// built-in exclusion list when given.
    #[arg(long = "exclude", value_name = "NAME")]
    exclude: Vec<String>,

    /// Backend request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e}");
        std::process::exit(exit_code);
    }
}

/// Configuration mistakes are user errors (exit 1); everything else is an
/// internal error (exit 2).
fn is_user_error(error: &anyhow::Error) -> bool {
    error.downcast_ref::<ConfigError>().is_some()
}

fn run(cli: Cli) -> Result<()> {
    // Load .env before resolving config; a missing file is fine
    let _ = dotenvy::dotenv();

    let config = Config::resolve(ConfigOverrides {
        root: cli.root,
        backend: cli.backend,
        api_key: cli.api_key,
        model: cli.model,
        retry_limit: cli.retry_limit,
        excluded_dirs: cli.exclude,
        timeout_secs: cli.timeout_secs,
    })?;

    let backend = backend::from_config(&config).context("failed to initialize tag backend")?;
    let processor = FileProcessor::new(backend, config.retry_limit);

    use notetag::stats::{BOLD, CYAN, DIM, GREEN, RED, RESET, YELLOW};

    println!(
        "{GREEN}{BOLD}notetag{RESET} using the {} backend",
        config.backend
    );
    println!("{CYAN}Scanning directory: {}{RESET}", config.root.display());

    let mut aggregator = StatsAggregator::new();
    for path in scanner::scan(&config.root, &config.excluded_dirs) {
        let outcome = processor.process(&path);

        let display = path.strip_prefix(&config.root).unwrap_or(&path).display();
        match outcome.kind {
            OutcomeKind::Tagged => println!(
                "{GREEN}tagged{RESET}  {display} -> {}",
                outcome.written_tags.join(", ")
            ),
            OutcomeKind::SkippedAlreadyTagged => {
                println!("{DIM}skipped{RESET} {display} (already tagged)");
            }
            OutcomeKind::FailedRetryExhausted => println!(
                "{YELLOW}failed{RESET}  {display} ({})",
                outcome.message.as_deref().unwrap_or("retries exhausted")
            ),
            OutcomeKind::Error => println!(
                "{RED}error{RESET}   {display} ({})",
                outcome.message.as_deref().unwrap_or("unknown error")
            ),
        }

        aggregator.record(&outcome);
    }

    print_report(&aggregator.finalize(), config.backend);
    Ok(())
}
