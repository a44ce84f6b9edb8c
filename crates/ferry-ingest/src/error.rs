//! Error taxonomy of the import pipeline
//!
//! - [`SourceError`]: the input cannot be opened or its structure cannot be
//!   followed. Fatal for the stream.
//! - [`RecordError`]: one record failed normalization. Skipped and counted.
//! - [`DispatchError`]: one batch round trip failed. Retried when retryable.
//! - [`LedgerError`]: the checkpoint file cannot be read or written.
//!
//! [`ImportError`] is what a run returns to its caller.

use crate::pipeline::ImportSummary;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot open '{location}': {source}")]
    Open {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read '{location}': {source}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request to '{location}' failed: {source}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{location}' answered HTTP {status}")]
    HttpStatus { location: String, status: u16 },

    #[error("'{location}' is not a valid URL: {message}")]
    InvalidLocation { location: String, message: String },

    #[error("invalid input structure at byte {offset}: {message}")]
    Structure { offset: u64, message: String },

    #[error("unexpected end of input: {0}")]
    Truncated(String),
}

/// An import setting that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid value '{value}' for {name}: {reason}")]
pub struct ConfigError {
    pub name: String,
    pub value: String,
    pub reason: String,
}

/// A single record that could not be normalized.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("record #{ordinal}: {reason}")]
pub struct RecordError {
    /// Zero-based position of the record in the source
    pub ordinal: u64,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API reported errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl DispatchError {
    /// Whether resubmitting the same batch may succeed.
    ///
    /// Transport failures, timeouts, 5xx and 429 are transient. Anything the
    /// API rejected on content is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Transport(e) => !e.is_builder() && !e.is_decode(),
            DispatchError::Status { status, .. } => *status >= 500 || *status == 429,
            DispatchError::GraphQl(_) | DispatchError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    File(#[from] ferry_common::CommonError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A batch that could not be written after all retries.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedBatch {
    pub first_alias: String,
    pub last_alias: String,
    pub records: usize,
    pub error: String,
}

impl fmt::Display for FailedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{} ({} records): {}",
            self.first_alias, self.last_alias, self.records, self.error
        )
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("could not read source: {0}")]
    Source(#[from] SourceError),

    #[error("could not load checkpoint: {0}")]
    CheckpointLoad(#[source] LedgerError),

    #[error("could not persist checkpoint: {0}")]
    Persistence(#[source] LedgerError),

    #[error(
        "could not reach API: {} of {} batches failed{}",
        .failed.len(),
        .summary.batches_sent,
        describe_failures(.failed)
    )]
    PartialImport {
        failed: Vec<FailedBatch>,
        summary: ImportSummary,
    },

    /// The source failed after records were already dispatched
    #[error("could not read source: {source}{}", describe_also_failed(.failed, .summary))]
    SourceInterrupted {
        source: SourceError,
        failed: Vec<FailedBatch>,
        summary: ImportSummary,
    },

    #[error("internal pipeline failure: {0}")]
    Internal(String),
}

impl ImportError {
    /// Counters of a run that got as far as dispatching
    pub fn summary(&self) -> Option<&ImportSummary> {
        match self {
            ImportError::PartialImport { summary, .. }
            | ImportError::SourceInterrupted { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

fn describe_also_failed(failed: &[FailedBatch], summary: &ImportSummary) -> String {
    if failed.is_empty() {
        return String::new();
    }
    format!(
        "; {} of {} batches also failed{}",
        failed.len(),
        summary.batches_sent,
        describe_failures(failed)
    )
}

fn describe_failures(failed: &[FailedBatch]) -> String {
    let shown: Vec<String> = failed.iter().take(3).map(|f| f.to_string()).collect();
    let more = failed.len().saturating_sub(shown.len());
    let mut text = format!(" [{}]", shown.join(", "));
    if more > 0 {
        text.push_str(&format!(" and {} more", more));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retry_classification() {
        let status = |status| DispatchError::Status {
            status,
            body: String::new(),
        };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!DispatchError::GraphQl(vec!["boom".into()]).is_retryable());
    }

    #[test]
    fn test_partial_import_names_alias_ranges() {
        let failed = vec![FailedBatch {
            first_alias: "mut50".into(),
            last_alias: "mut99".into(),
            records: 50,
            error: "API answered HTTP 500".into(),
        }];
        let err = ImportError::PartialImport {
            failed,
            summary: ImportSummary {
                batches_sent: 3,
                ..ImportSummary::default()
            },
        };
        let text = err.to_string();
        assert!(text.starts_with("could not reach API: 1 of 3 batches failed"));
        assert!(text.contains("mut50..mut99 (50 records)"));
    }

    #[test]
    fn test_interrupted_source_mentions_failed_batches() {
        let summary = ImportSummary {
            batches_sent: 2,
            records_written: 50,
            ..ImportSummary::default()
        };
        let clean = ImportError::SourceInterrupted {
            source: SourceError::Truncated("missing ]".into()),
            failed: Vec::new(),
            summary: summary.clone(),
        };
        assert_eq!(
            clean.to_string(),
            "could not read source: unexpected end of input: missing ]"
        );
        assert_eq!(clean.summary().map(|s| s.records_written), Some(50));

        let failing = ImportError::SourceInterrupted {
            source: SourceError::Truncated("missing ]".into()),
            failed: vec![FailedBatch {
                first_alias: "mut50".into(),
                last_alias: "mut59".into(),
                records: 10,
                error: "API answered HTTP 500".into(),
            }],
            summary,
        };
        assert!(failing
            .to_string()
            .contains("; 1 of 2 batches also failed [mut50..mut59 (10 records)"));
        assert!(ImportError::Internal("x".into()).summary().is_none());
    }
}
