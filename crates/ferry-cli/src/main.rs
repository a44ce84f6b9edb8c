//! Ferry CLI - Main entry point

use clap::Parser;
use colored::Colorize;
use ferry_cli::{CheckpointCommand, Cli, Commands};
use ferry_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Handle markdown help generation
    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(ref command) = cli.command else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    // Console logging on stderr: warnings by default, debug with --verbose
    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("ferry")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.clone().apply_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring logging settings: {}", e);
            log_config
        }
    };

    // The CLI works without logging, so setup failures are not fatal
    let guard = init_logging(&log_config).ok().flatten();

    if let Err(e) = execute_command(command).await {
        error!(error = %e, "Command failed");
        eprintln!("{} {}", "Error:".red().bold(), e);
        let code = e.exit_code();
        drop(guard);
        process::exit(code);
    }
}

/// Execute the CLI command
async fn execute_command(command: &Commands) -> ferry_cli::Result<()> {
    match command {
        Commands::Import(args) => ferry_cli::commands::import::run(args).await,

        Commands::Checkpoint { command } => match command {
            CheckpointCommand::Show { checkpoint } => {
                ferry_cli::commands::checkpoint::show(checkpoint.as_ref()).await
            }
            CheckpointCommand::Clear { checkpoint, yes } => {
                ferry_cli::commands::checkpoint::clear(checkpoint.as_ref(), *yes).await
            }
        },
    }
}
