//! `ferry import` command implementation
//!
//! Streams an export into the API and prints a one-line summary.

use crate::config::Config;
use crate::error::{CliError, Result};
use crate::progress;
use crate::ImportArgs;
use colored::Colorize;
use ferry_ingest::api::GraphQlClient;
use ferry_ingest::source::open_source;
use ferry_ingest::{events, EventSender, ImportConfig, ImportPipeline, ImportSummary};
use std::sync::Arc;
use tracing::info;

/// Run an import
pub async fn run(args: &ImportArgs) -> Result<()> {
    let config = Config::from_env()?;
    let endpoint = config.endpoint_url(args.endpoint.as_deref())?;

    let mut client = GraphQlClient::new(endpoint, config.api_timeout)?;
    if let Some(token) = args.token.as_ref().or(config.token.as_ref()) {
        client = client.with_token(token.clone());
    }

    let import_config = import_config(args, &config)?;
    let source = open_source(&args.source)?;

    if !args.quiet {
        println!(
            "{} Importing {} into {}",
            "→".cyan(),
            source.location(),
            client.endpoint()
        );
    }
    info!(
        source = source.location(),
        endpoint = %client.endpoint(),
        checkpoint = %import_config.checkpoint_path.display(),
        "Starting import"
    );

    let (sender, reporter) = if args.quiet {
        (EventSender::disabled(), None)
    } else {
        let (tx, rx) = events::channel();
        (tx, Some(progress::spawn_reporter(rx)))
    };

    let pipeline = ImportPipeline::new(import_config, Arc::new(client), sender);
    let outcome = pipeline.run(source.as_ref()).await;
    // Closes the event channel so the reporter can finish drawing.
    drop(pipeline);
    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }

    match outcome {
        Ok(summary) => {
            print_summary(&summary, true);
            Ok(())
        }
        Err(err) => {
            // Records may have been imported before the run failed.
            if let Some(summary) = err.summary() {
                print_summary(summary, false);
            }
            Err(CliError::Import(err))
        }
    }
}

/// Library defaults, then FERRY_* overrides, then flags.
fn import_config(args: &ImportArgs, config: &Config) -> Result<ImportConfig> {
    let mut import_config = ImportConfig::from_env()?;
    import_config.checkpoint_path = config.checkpoint(args.checkpoint.as_ref());

    if let Some(size) = args.batch_size {
        import_config.batch_size = size;
    }
    if let Some(concurrency) = args.concurrency {
        import_config.concurrency = concurrency.max(1);
    }
    if let Some(retries) = args.max_retries {
        import_config.retry.max_attempts = retries.saturating_add(1);
    }
    if let Some(format) = args.format {
        import_config.format = Some(format);
    }

    Ok(import_config)
}

/// The line printed after every import
pub fn summary_line(summary: &ImportSummary) -> String {
    format!(
        "Read {} records, {} skipped (already imported), {} imported in {:.1}s",
        summary.records_read,
        summary.records_skipped,
        summary.records_written,
        summary.elapsed.as_secs_f64()
    )
}

fn print_summary(summary: &ImportSummary, complete: bool) {
    let mark = if complete {
        "✓".green()
    } else {
        "!".yellow()
    };
    println!("{} {}", mark, summary_line(summary));
    if summary.records_malformed > 0 {
        println!(
            "  {} malformed records were skipped; run with --verbose for details",
            summary.records_malformed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_summary_line() {
        let summary = ImportSummary {
            records_read: 120,
            records_skipped: 120,
            elapsed: Duration::from_millis(1300),
            ..ImportSummary::default()
        };
        assert_eq!(
            summary_line(&summary),
            "Read 120 records, 120 skipped (already imported), 0 imported in 1.3s"
        );
    }
}
