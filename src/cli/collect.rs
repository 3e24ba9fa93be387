//! Collect and resume commands

use crate::collector::config::{
    DEFAULT_DATA_DIR, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_PAGES_PER_WINDOW,
    DEFAULT_MAX_RETRIES, DEFAULT_RATE_LIMIT_MS, MAX_RETRIES_LIMIT,
};
use crate::collector::{
    CollectorConfig, RecoveryController, RunContext, RunOutcome, RunTermination, Termination,
};
use crate::fetcher::HttpPageFetcher;
use crate::shutdown::SharedShutdown;
use crate::Query;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::CliError;

/// Timeline Harvester CLI
#[derive(Parser, Debug)]
#[command(name = "timeline-harvester")]
#[command(about = "Collect records from a paginated, time-ordered source with checkpointed resume", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Root directory for run directories
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Minimum delay between fetches, in milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_RATE_LIMIT_MS)]
    pub rate_limit_ms: u64,

    /// Timeout for one page request attempt, in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub fetch_timeout_secs: u64,

    /// Maximum pages fetched for a single day
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_PAGES_PER_WINDOW, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: u32,

    /// Retries per fetch for transient HTTP failures (0-10)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=MAX_RETRIES_LIMIT as i64))]
    pub max_retries: u32,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Collector tunables from the global flags
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::default()
            .with_rate_limit(Duration::from_millis(self.rate_limit_ms))
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_max_pages(self.max_pages)
            .with_max_retries(self.max_retries)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new collection run
    Collect(CollectArgs),

    /// Continue an interrupted run from its checkpoint
    Resume(ResumeArgs),

    /// Check a checkpoint and its record store
    Validate(super::ValidateCommand),

    /// Export a run's records to CSV
    Export(super::ExportCommand),
}

/// Arguments for a fresh run
#[derive(Parser, Debug)]
pub struct CollectArgs {
    /// Search expression passed to the source
    #[arg(long)]
    pub query: String,

    /// First day to collect (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub since: String,

    /// Day after the last day to collect (YYYY-MM-DD, exclusive)
    #[arg(long)]
    pub until: String,

    /// Total number of records to collect
    #[arg(long)]
    pub limit: u64,

    /// Page endpoint URL
    #[arg(long)]
    pub endpoint: String,

    /// Discard an existing run for the same query and start over
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

/// Arguments for resuming a run
#[derive(Parser, Debug)]
pub struct ResumeArgs {
    /// Checkpoint file of the run (`<data-dir>/<run-id>/checkpoint.json`)
    pub checkpoint: PathBuf,

    /// Page endpoint URL
    #[arg(long)]
    pub endpoint: String,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

impl CollectArgs {
    /// Build the query from the arguments
    pub fn to_query(&self) -> Result<Query, CliError> {
        let since = Query::parse_date(&self.since)?;
        let until = Query::parse_date(&self.until)?;
        Ok(Query::new(self.query.clone(), since, until, self.limit)?)
    }

    /// Start a fresh run
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<RunTermination, CliError> {
        let query = self.to_query()?;
        let config = cli.collector_config();
        let fetcher = HttpPageFetcher::new(&self.endpoint, &config)?;

        info!(query = %query, endpoint = %fetcher.endpoint(), "Collect requested");

        let context = RunContext::new(cli.data_dir.clone(), query.clone(), config);
        let mut controller =
            RecoveryController::start(context, fetcher, self.force)?.with_shutdown(shutdown);
        if cli.output_format == OutputFormat::Human {
            controller = controller.with_progress_bar(create_progress_bar(&query));
        }

        let outcome = controller.run().await?;
        report(cli.output_format, &outcome);
        Ok(outcome.termination)
    }
}

impl ResumeArgs {
    /// Continue the run that owns the checkpoint
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<RunTermination, CliError> {
        let config = cli.collector_config();
        let fetcher = HttpPageFetcher::new(&self.endpoint, &config)?;

        info!(checkpoint = %self.checkpoint.display(), endpoint = %fetcher.endpoint(), "Resume requested");

        let mut controller =
            RecoveryController::resume(&self.checkpoint, fetcher, config)?.with_shutdown(shutdown);
        if cli.output_format == OutputFormat::Human {
            let query = controller.checkpoint().query.clone();
            controller = controller.with_progress_bar(create_progress_bar(&query));
        }

        let outcome = controller.run().await?;
        report(cli.output_format, &outcome);
        Ok(outcome.termination)
    }
}

fn report(format: OutputFormat, outcome: &RunOutcome) {
    match format {
        OutputFormat::Json => output_json(outcome),
        OutputFormat::Human => output_human(outcome),
    }
}

/// Output the run outcome as a single JSON line
fn output_json(outcome: &RunOutcome) {
    let output = serde_json::json!({
        "success": true,
        "termination": outcome.termination,
        "run_id": outcome.run_id,
        "checkpoint": outcome.checkpoint_path.display().to_string(),
        "stored_records": outcome.stored_records,
        "shortfall": outcome.shortfall,
        "windows": outcome.windows,
    });
    println!("{output}");
}

/// Output the run outcome in human-readable form
fn output_human(outcome: &RunOutcome) {
    match outcome.termination {
        RunTermination::Done => println!("\nCollection completed!"),
        RunTermination::Interrupted => println!("\nCollection interrupted."),
    }
    println!("Run: {}", outcome.run_id);
    println!("Records stored: {}", outcome.stored_records);
    if outcome.shortfall > 0 {
        println!("Shortfall: {} records below quota", outcome.shortfall);
    }
    for report in &outcome.windows {
        let marker = match report.termination {
            Termination::QuotaReached => "ok",
            Termination::Interrupted => "interrupted",
            Termination::End(_) if report.shortfall() > 0 => "short",
            Termination::End(_) => "ok",
        };
        println!(
            "  {} [{marker}] {} records, {} pages ({})",
            report.window.since, report.collected, report.pages, report.termination
        );
    }
    if outcome.termination == RunTermination::Interrupted {
        println!(
            "Resume with: timeline-harvester resume {} --endpoint <URL>",
            outcome.checkpoint_path.display()
        );
    }
}

/// Progress bar over the run's quota
fn create_progress_bar(query: &Query) -> ProgressBar {
    let pb = ProgressBar::new(query.quota());
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(format!("Collecting \"{}\"", query.search()));
    pb
}
