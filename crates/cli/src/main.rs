mod metrics;
mod sink;
mod wiring;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mortem_core::{
    load_config, resolve_secrets, validate_config, Candidate, Config, RunSummary,
    SanitizedConfig,
};

use sink::JsonLinesSink;

/// Cause-of-death enrichment for public figure records
#[derive(Parser, Debug)]
#[command(name = "mortem")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "mortem.toml", env = "MORTEM_CONFIG")]
    config: PathBuf,

    /// Emit logs as JSON objects
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich a batch of candidates
    Run {
        /// Candidates, one JSON object per line
        #[arg(long)]
        candidates: PathBuf,

        /// Where to write decisions as JSON lines (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Compute decisions without writing them anywhere
        #[arg(long)]
        dry_run: bool,

        /// Process at most this many candidates
        #[arg(long)]
        limit: Option<usize>,

        /// Write Prometheus metrics to this file after the run
        #[arg(long)]
        metrics: Option<PathBuf>,
    },
    /// Inspect and maintain saved login sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsAction {
    /// Show every stored session
    List,
    /// Delete expired sessions
    Cleanup,
    /// Delete the session for one site
    Delete { site: String },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    );
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }

    let config = prepare_config(&cli.config)?;

    match cli.command {
        Command::Run {
            candidates,
            output,
            dry_run,
            limit,
            metrics: metrics_path,
        } => {
            run_batch(config, &candidates, output.as_deref(), dry_run, limit).await?;
            if let Some(path) = metrics_path {
                std::fs::write(&path, metrics::encode_metrics()?)
                    .with_context(|| format!("Failed to write metrics to {:?}", path))?;
                info!("Metrics written to {:?}", path);
            }
            Ok(())
        }
        Command::Sessions { action } => sessions(&config, action),
    }
}

/// Load, resolve and validate the configuration.
fn prepare_config(path: &Path) -> Result<Config> {
    info!("Loading configuration from {:?}", path);
    let mut config =
        load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?;
    resolve_secrets(&mut config).context("Failed to resolve secrets")?;
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    info!(config = %sanitized, "Configuration loaded successfully");
    Ok(config)
}

async fn run_batch(
    mut config: Config,
    candidates_path: &Path,
    output: Option<&Path>,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<()> {
    if dry_run {
        config.run.dry_run = true;
    }
    if limit.is_some() {
        config.run.limit = limit;
    }

    let candidates = read_candidates(candidates_path)?;
    info!(count = candidates.len(), "Read candidates from {:?}", candidates_path);

    let out: Box<dyn io::Write + Send> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
        ),
        None => Box::new(io::stdout()),
    };
    let sink = Arc::new(JsonLinesSink::new(out));
    let orchestrator = wiring::build_orchestrator(&config)?.with_sink(sink);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight candidates");
            on_signal.cancel();
        }
    });

    let decisions = orchestrator
        .run_with_cancellation(candidates, &config.run, cancel)
        .await
        .context("Run aborted")?;

    // Dry-run decisions never reach the sink; show them for inspection.
    if config.run.dry_run {
        for decision in &decisions {
            println!("{}", serde_json::to_string(decision)?);
        }
    }

    let summary = RunSummary::from_decisions(&decisions);
    eprintln!(
        "{} candidates: {} matched, {} exhausted, {} skipped, {} errors, {} cancelled",
        summary.total,
        summary.matched,
        summary.exhausted,
        summary.skipped,
        summary.errors,
        summary.cancelled
    );
    Ok(())
}

/// Parse a JSON-lines candidate file. Blank lines are ignored.
fn read_candidates(path: &Path) -> Result<Vec<Candidate>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    parse_candidates(BufReader::new(file))
        .with_context(|| format!("Failed to read candidates from {:?}", path))
}

fn parse_candidates(reader: impl BufRead) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let candidate: Candidate = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid candidate", index + 1))?;
        candidates.push(candidate);
    }
    Ok(candidates)
}

fn sessions(config: &Config, action: SessionsAction) -> Result<()> {
    let store = wiring::open_session_store(config)?;
    match action {
        SessionsAction::List => {
            let now = Utc::now();
            let sessions = store.list().context("Failed to list sessions")?;
            if sessions.is_empty() {
                println!("No stored sessions");
            }
            for session in sessions {
                let status = if !session.valid {
                    "invalid"
                } else if session.is_expired(now) {
                    "expired"
                } else {
                    "active"
                };
                println!(
                    "{:<16} {:<8} created {}  expires {}  last used {}",
                    session.site,
                    status,
                    session.created_at.format("%Y-%m-%d %H:%M"),
                    session.expires_at.format("%Y-%m-%d %H:%M"),
                    session.last_used_at.format("%Y-%m-%d %H:%M"),
                );
            }
        }
        SessionsAction::Cleanup => {
            let purged = store
                .purge_expired(Utc::now())
                .context("Failed to purge sessions")?;
            println!("Removed {} expired session(s)", purged);
        }
        SessionsAction::Delete { site } => {
            if store.delete(&site).context("Failed to delete session")? {
                println!("Deleted session for {}", site);
            } else {
                println!("No session stored for {}", site);
            }
        }
    }
    Ok(())
}
