//! Export subcommand

use super::{CliError, OutputFormat};
use crate::collector::controller::RunPaths;
use crate::resume::CheckpointStore;
use crate::store::CsvExporter;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Export a run's record store as CSV
#[derive(Parser, Debug)]
pub struct ExportCommand {
    /// Checkpoint file of the run
    pub checkpoint: PathBuf,

    /// CSV file to write
    #[arg(long)]
    pub output: PathBuf,
}

impl ExportCommand {
    /// Execute the export command
    pub async fn execute(&self, format: OutputFormat) -> Result<u64, CliError> {
        // Reading the checkpoint confirms the path really is a run before touching its store
        let checkpoint = CheckpointStore::new(&self.checkpoint).read()?;
        let paths = RunPaths::for_checkpoint(&self.checkpoint);

        info!(run_id = %checkpoint.run_id, output = %self.output.display(), "Exporting records");
        let rows = CsvExporter::export_store(&paths.store, &self.output)?;

        match format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({
                    "success": true,
                    "run_id": checkpoint.run_id,
                    "output": self.output.display().to_string(),
                    "rows": rows,
                })
            ),
            OutputFormat::Human => {
                println!("Exported {rows} records to {}", self.output.display());
            }
        }
        Ok(rows)
    }
}
