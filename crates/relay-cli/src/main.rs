//! llm-relay CLI — entry point.
//!
//! # Commands
//!
//! - `llm-relay run --input FILE [--output FILE]` — dispatch a batch
//! - `llm-relay status` — show configuration and provider status
//! - `llm-relay init` — write a default config file

mod batch;
mod helpers;
mod init;
mod status;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relay_core::config::load_config;
use relay_dispatch::{Orchestrator, ResponseCache};
use relay_providers::{
    CallObserver, CallStats, FanoutObserver, HttpTransport, ProviderRegistry, RequestExecutor,
    TracingObserver,
};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Batch dispatcher for chat-completion style HTTP providers
#[derive(Parser)]
#[command(name = "llm-relay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a batch of conversations and write one result per input
    Run {
        /// Batch file (JSON array of prompts or conversations); "-" reads stdin
        #[arg(short, long)]
        input: String,

        /// Result file; defaults to stdout
        #[arg(short, long)]
        output: Option<String>,

        /// Config file; defaults to ~/.llm-relay/config.json
        #[arg(short, long)]
        config: Option<String>,

        /// Stop waiting after this many seconds; unfinished slots fail as cancelled
        #[arg(long)]
        deadline: Option<u64>,

        /// Maximum in-flight provider calls
        #[arg(long)]
        concurrency: Option<usize>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and provider status
    Status {
        /// Config file; defaults to ~/.llm-relay/config.json
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Write a default config file
    Init {
        /// Config file; defaults to ~/.llm-relay/config.json
        #[arg(short, long)]
        config: Option<String>,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            config,
            deadline,
            concurrency,
            logs,
        } => {
            init_logging(logs);
            run_batch(RunArgs {
                input,
                output,
                config,
                deadline,
                concurrency,
            })
            .await
        }
        Commands::Status { config } => {
            status::run(config.as_deref().map(helpers::expand_tilde).as_deref())
        }
        Commands::Init { config } => {
            init::run(config.as_deref().map(helpers::expand_tilde).as_deref())
        }
    }
}

// ─────────────────────────────────────────────
// Run command
// ─────────────────────────────────────────────

struct RunArgs {
    input: String,
    output: Option<String>,
    config: Option<String>,
    deadline: Option<u64>,
    concurrency: Option<usize>,
}

async fn run_batch(args: RunArgs) -> Result<()> {
    let config_path: Option<PathBuf> = args.config.as_deref().map(helpers::expand_tilde);
    let config = load_config(config_path.as_deref());

    let text = read_input(&args.input)?;
    let requests = batch::parse_batch(&text)
        .with_context(|| format!("failed to parse batch input {}", args.input))?;

    let registry = ProviderRegistry::from_config(&config)
        .context("provider configuration is invalid; run `llm-relay status`")?;

    let stats = Arc::new(CallStats::new());
    let observer = FanoutObserver::new(vec![
        stats.clone() as Arc<dyn CallObserver>,
        Arc::new(TracingObserver),
    ]);
    let executor = RequestExecutor::new(
        Arc::new(registry),
        Arc::new(HttpTransport::new()),
        Arc::new(observer),
    )
    .with_retry_backoff(config.dispatch.retry_backoff());

    let cache = config
        .cache
        .enabled
        .then(|| Arc::new(ResponseCache::new(config.cache.ttl())));

    let mut orchestrator =
        Orchestrator::new(Arc::new(executor), cache).with_dispatch_config(&config.dispatch);
    if let Some(n) = args.concurrency {
        orchestrator = orchestrator.with_max_concurrency(n);
    }
    if let Some(secs) = args.deadline {
        orchestrator = orchestrator.with_deadline(Some(Duration::from_secs(secs)));
    }

    // Ctrl-C stops the batch; finished slots are still written out
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling outstanding requests");
                cancel.cancel();
            }
        });
    }

    info!(
        requests = requests.len(),
        concurrency = orchestrator.max_concurrency(),
        "Starting batch"
    );
    let results = orchestrator
        .run_batch_until(&requests, cancel)
        .await
        .context("batch aborted")?;

    let records = batch::to_records(&results);
    let json = serde_json::to_string_pretty(&records)?;
    match args.output.as_deref() {
        Some(path) => {
            let path = helpers::expand_tilde(path);
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }

    helpers::print_summary(&results, &stats.snapshot());
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read batch from stdin")?;
        return Ok(text);
    }
    let path = helpers::expand_tilde(input);
    std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
}

// ─────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("relay=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
