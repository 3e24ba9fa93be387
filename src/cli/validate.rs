//! Validation subcommand

use super::{CliError, OutputFormat};
use crate::collector::controller::RunPaths;
use crate::resume::{Checkpoint, CheckpointStore};
use crate::store::{RecordStore, ReplaySummary};
use clap::Parser;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Validate command for checking a checkpoint and its record store
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// Checkpoint file of the run
    pub checkpoint: PathBuf,
}

/// What validation found
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Run identifier
    pub run_id: String,
    /// Checkpoint status
    pub status: String,
    /// First unprocessed day
    pub boundary: String,
    /// Records the checkpoint says were stored
    pub checkpoint_records: u64,
    /// Complete records in the store
    pub store_records: u64,
    /// Records stored after the last checkpoint (a partially collected window)
    pub uncheckpointed_records: u64,
    /// Store ends in an unterminated line
    pub torn_tail: bool,
    /// Urls stored more than once
    pub duplicate_urls: u64,
    /// Problems found
    pub problems: Vec<String>,
}

impl ValidateCommand {
    /// Execute the validation command
    pub async fn execute(&self, format: OutputFormat) -> Result<(), CliError> {
        let report = self.validate()?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::json!(report)),
            OutputFormat::Human => print_human(&report),
        }

        if report.problems.is_empty() {
            Ok(())
        } else {
            Err(CliError::ValidationFailed(report.problems.join("; ")))
        }
    }

    /// Check checkpoint readability and consistency with the store
    ///
    /// An unreadable or inconsistent checkpoint is an error; store-level problems are
    /// collected into the report.
    pub fn validate(&self) -> Result<ValidationReport, CliError> {
        let checkpoint = CheckpointStore::new(&self.checkpoint).read()?;
        checkpoint.verify()?;

        let paths = RunPaths::for_checkpoint(&self.checkpoint);
        let mut seen = HashSet::new();
        let mut duplicate_urls = 0u64;
        let summary = RecordStore::replay(&paths.store, |record| {
            if !seen.insert(record.url) {
                duplicate_urls += 1;
            }
            Ok(())
        })?;

        Ok(build_report(&checkpoint, &summary, duplicate_urls))
    }
}

fn build_report(checkpoint: &Checkpoint, summary: &ReplaySummary, duplicate_urls: u64) -> ValidationReport {
    let mut problems = Vec::new();

    if summary.records < checkpoint.stored_records {
        problems.push(format!(
            "store has {} records but the checkpoint recorded {}",
            summary.records, checkpoint.stored_records
        ));
    }
    if duplicate_urls > 0 {
        problems.push(format!("{duplicate_urls} duplicate url(s) in the store"));
    }

    ValidationReport {
        run_id: checkpoint.run_id.clone(),
        status: format!("{:?}", checkpoint.status).to_lowercase(),
        boundary: checkpoint.boundary.to_string(),
        checkpoint_records: checkpoint.stored_records,
        store_records: summary.records,
        uncheckpointed_records: summary.records.saturating_sub(checkpoint.stored_records),
        torn_tail: summary.torn_tail,
        duplicate_urls,
        problems,
    }
}

fn print_human(report: &ValidationReport) {
    println!("Run: {}", report.run_id);
    println!("  Status: {}", report.status);
    println!("  Boundary: {}", report.boundary);
    println!("  Checkpoint records: {}", report.checkpoint_records);
    println!("  Store records: {}", report.store_records);
    if report.uncheckpointed_records > 0 {
        println!(
            "  Records after last checkpoint: {} (re-checked on resume)",
            report.uncheckpointed_records
        );
    }
    if report.torn_tail {
        println!("  Store ends in a partial line (repaired on resume)");
    }

    if report.problems.is_empty() {
        println!("\nValid");
    } else {
        println!("\nProblems:");
        for problem in &report.problems {
            println!("  - {problem}");
        }
    }
}
