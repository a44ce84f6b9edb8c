//! Ferry CLI Library
//!
//! Command-line interface for importing data exports into a GraphQL API.
//!
//! # Overview
//!
//! - **Import**: stream a JSON or ND-JSON export into the API (`ferry import`)
//! - **Checkpoint**: inspect or reset the record of what was imported
//!   (`ferry checkpoint show/clear`)
//!
//! Re-running an import with the same checkpoint only sends records that
//! were not confirmed by the API before.

pub mod commands;
pub mod config;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand};
use ferry_ingest::RecordFormat;
use std::path::PathBuf;

/// Ferry - resumable batch importer for GraphQL APIs
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the CLI reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import records from a file or URL
    Import(ImportArgs),

    /// Inspect or reset the import checkpoint
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Path or http(s) URL of the export
    pub source: String,

    /// GraphQL endpoint (defaults to FERRY_ENDPOINT)
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Bearer token (defaults to FERRY_TOKEN)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Records per batch; values below 50 are raised to 50
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Maximum batches in flight
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Input format (json, ndjson); inferred from the extension by default
    #[arg(short, long)]
    pub format: Option<RecordFormat>,

    /// Checkpoint file (defaults to FERRY_CHECKPOINT or ./.migrationstate)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Retries per batch after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Do not draw progress bars
    #[arg(short, long)]
    pub quiet: bool,
}

/// Checkpoint subcommands
#[derive(Subcommand, Debug)]
pub enum CheckpointCommand {
    /// Show how many records of each type were imported
    Show {
        /// Checkpoint file
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Delete the checkpoint so the next import starts over
    Clear {
        /// Checkpoint file
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}
