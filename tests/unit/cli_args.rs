//! Unit tests for CLI argument parsing

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use timeline_harvester::cli::{Cli, Commands, OutputFormat};

#[test]
fn test_global_flags_build_collector_config() {
    let cli = Cli::parse_from([
        "timeline-harvester",
        "--rate-limit-ms",
        "250",
        "--fetch-timeout-secs",
        "3",
        "--max-pages",
        "7",
        "--max-retries",
        "0",
        "--output-format",
        "json",
        "--data-dir",
        "/tmp/runs",
        "resume",
        "/tmp/runs/abc/checkpoint.json",
        "--endpoint",
        "http://localhost:8080/page",
    ]);

    let config = cli.collector_config();
    assert_eq!(config.rate_limit, Duration::from_millis(250));
    assert_eq!(config.fetch_timeout, Duration::from_secs(3));
    assert_eq!(config.max_pages_per_window, 7);
    assert_eq!(config.max_retries, 0);
    assert!(config.validate().is_ok());
    assert_eq!(cli.output_format, OutputFormat::Json);
    assert_eq!(cli.data_dir, PathBuf::from("/tmp/runs"));

    let Commands::Resume(args) = cli.command else {
        panic!("expected resume");
    };
    assert_eq!(args.checkpoint, PathBuf::from("/tmp/runs/abc/checkpoint.json"));
}

#[test]
fn test_zero_fetch_timeout_rejected() {
    let result = Cli::try_parse_from([
        "timeline-harvester",
        "--fetch-timeout-secs",
        "0",
        "validate",
        "checkpoint.json",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_export_requires_output() {
    let result = Cli::try_parse_from(["timeline-harvester", "export", "checkpoint.json"]);
    assert!(result.is_err());
}
