//! Error types for Ferry CLI
//!
//! Messages are user-facing. [`CliError::exit_code`] tells scripts which
//! kind of failure ended the run.

use ferry_ingest::error::ConfigError;
use ferry_ingest::{DispatchError, ImportError, LedgerError, SourceError};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_SOURCE: i32 = 3;
pub const EXIT_API: i32 = 4;
pub const EXIT_CHECKPOINT: i32 = 5;

#[derive(Error, Debug)]
pub enum CliError {
    /// The import itself failed
    #[error(transparent)]
    Import(#[from] ImportError),

    /// Checkpoint file could not be read or removed
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] LedgerError),

    /// API client could not be constructed
    #[error("Failed to set up API client: {0}")]
    Client(#[from] DispatchError),

    /// An import setting from the environment is malformed
    #[error("Invalid setting: {0}. Check your FERRY_* environment variables.")]
    Setting(#[from] ConfigError),

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your flags and environment variables.")]
    Config(String),

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions.")]
    Io(#[from] std::io::Error),
}

impl From<SourceError> for CliError {
    fn from(err: SourceError) -> Self {
        Self::Import(ImportError::Source(err))
    }
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Import(ImportError::Source(_))
            | CliError::Import(ImportError::SourceInterrupted { .. }) => EXIT_SOURCE,
            CliError::Import(ImportError::PartialImport { .. }) => EXIT_API,
            CliError::Import(ImportError::CheckpointLoad(_))
            | CliError::Import(ImportError::Persistence(_))
            | CliError::Checkpoint(_) => EXIT_CHECKPOINT,
            _ => EXIT_FAILURE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_ingest::ImportSummary;

    #[test]
    fn test_exit_codes() {
        let source = CliError::from(SourceError::Truncated("eof".into()));
        assert_eq!(source.exit_code(), 3);
        assert!(source.to_string().starts_with("could not read source"));

        let interrupted = CliError::from(ImportError::SourceInterrupted {
            source: SourceError::Truncated("eof".into()),
            failed: Vec::new(),
            summary: ImportSummary::default(),
        });
        assert_eq!(interrupted.exit_code(), 3);

        let partial = CliError::from(ImportError::PartialImport {
            failed: Vec::new(),
            summary: ImportSummary::default(),
        });
        assert_eq!(partial.exit_code(), 4);

        assert_eq!(CliError::config("no endpoint").exit_code(), 1);
    }
}
