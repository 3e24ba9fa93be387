//! Main entry point for the timeline-harvester CLI

use clap::Parser;
use timeline_harvester::cli::{Cli, Commands, EXIT_FAILURE, EXIT_INTERRUPTED};
use timeline_harvester::collector::RunTermination;
use timeline_harvester::metrics::init_metrics;
use timeline_harvester::shutdown::ShutdownCoordinator;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("timeline_harvester=info"));

    // Logs go to stderr so `--output-format json` keeps stdout machine-readable
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: &Cli) -> anyhow::Result<Option<RunTermination>> {
    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr)?;
    }

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - stopping at the next record boundary...");
                shutdown.request_shutdown();
            }
        }
    });

    let termination = match &cli.command {
        Commands::Collect(args) => Some(args.execute(cli, shutdown).await?),
        Commands::Resume(args) => Some(args.execute(cli, shutdown).await?),
        Commands::Validate(cmd) => {
            cmd.execute(cli.output_format).await?;
            None
        }
        Commands::Export(cmd) => {
            cmd.execute(cli.output_format).await?;
            None
        }
    };
    Ok(termination)
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(Some(RunTermination::Interrupted)) => std::process::exit(EXIT_INTERRUPTED),
        Ok(_) => {}
        Err(e) => {
            error!("Command failed: {e:#}");
            eprintln!("Error: {e:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}
