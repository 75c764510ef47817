//! devblog-curator: command-line entrypoint.
//! Loads the configuration snapshot once, wires the collaborators, runs one job
//! and prints its `RunResult` as JSON. Exit code: 0 success, 1 job error,
//! 2 configuration/startup error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use devblog_curator::cancel::CancellationToken;
use devblog_curator::classify::build_service_from_config;
use devblog_curator::config::ai::AiConfig;
use devblog_curator::config::{ConfigSnapshot, DEFAULT_CONFIG_DIR};
use devblog_curator::ingest::providers::HttpFeedSource;
use devblog_curator::metrics::Metrics;
use devblog_curator::storage::FsStorage;
use devblog_curator::{Pipeline, RunResult, WeekId};

#[derive(Debug, Parser)]
#[command(name = "devblog-curator", version, about)]
struct Cli {
    /// Directory holding categories.toml, feeds.toml, curator.toml and ai.json.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
    /// Print the Prometheus exposition to stderr after the run.
    #[arg(long, global = true)]
    print_metrics: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch, classify and persist one day of articles.
    Daily {
        /// Defaults to today (UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Rank the week's articles and persist the reading lists.
    Weekly {
        /// ISO week, e.g. 2026-W42. Defaults to the current week.
        #[arg(long)]
        week: Option<WeekId>,
    },
    /// Validate the configured candidate feeds.
    Discover,
    /// Load and validate configuration, then exit.
    ValidateConfig,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("devblog_curator=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

fn build_pipeline(config_dir: &Path, snapshot: Arc<ConfigSnapshot>) -> anyhow::Result<Pipeline> {
    let settings = &snapshot.settings;
    let ai = AiConfig::load_or_disabled(config_dir.join("ai.json"))
        .context("loading ai.json")?;
    let service = build_service_from_config(
        &ai,
        Path::new(&settings.storage.ai_cache_dir),
        settings.classify.timeout_secs,
    )?;
    tracing::info!(provider = service.provider_name(), "classification service ready");
    let source = HttpFeedSource::new(&settings.fetch)?;
    let storage = FsStorage::new(&settings.storage.root);
    Ok(Pipeline::new(
        snapshot,
        Arc::new(source),
        service,
        Arc::new(storage),
    ))
}

fn print_result(result: &RunResult) {
    match serde_json::to_string_pretty(result) {
        Ok(s) => println!("{s}"),
        Err(e) => tracing::error!(error = %e, "could not encode run result"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let metrics = if cli.print_metrics {
        match Metrics::init() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "metrics recorder not installed");
                None
            }
        }
    } else {
        None
    };

    let snapshot = match ConfigSnapshot::load(&cli.config_dir) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "configuration invalid");
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    if let Command::ValidateConfig = cli.command {
        let summary = serde_json::json!({
            "categories": snapshot.categories.ids().collect::<Vec<_>>(),
            "feeds": snapshot.feeds.len(),
            "active_feeds": snapshot.active_feeds().count(),
            "discovery_candidates": snapshot.settings.discovery.candidates.len(),
        });
        println!("{summary:#}");
        return ExitCode::SUCCESS;
    }

    let pipeline = match build_pipeline(&cli.config_dir, snapshot) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "startup failed");
            eprintln!("startup error: {e:#}");
            return ExitCode::from(2);
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling run");
                cancel.cancel();
            }
        });
    }

    let result = match cli.command {
        Command::Daily { date } => pipeline.run_daily_ingestion_with(date, &cancel).await,
        Command::Weekly { week } => pipeline.run_weekly_curation_with(week, &cancel).await,
        Command::Discover => pipeline.discover_new_feeds_with(&cancel).await,
        Command::ValidateConfig => return ExitCode::SUCCESS,
    };

    print_result(&result);
    if let Some(m) = metrics {
        eprintln!("{}", m.render());
    }
    ExitCode::from(result.exit_code() as u8)
}
