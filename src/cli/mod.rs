//! CLI command implementations

pub mod collect;
pub mod error;
pub mod export;
pub mod validate;

pub use collect::{Cli, CollectArgs, Commands, OutputFormat, ResumeArgs};
pub use error::{CliError, EXIT_FAILURE, EXIT_INTERRUPTED};
pub use export::ExportCommand;
pub use validate::ValidateCommand;
