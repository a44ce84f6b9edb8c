//! Build automation tasks for Ferry
//!
//! Currently this only regenerates the CLI reference from the clap
//! definitions in `ferry-cli`.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for Ferry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Write the CLI reference as markdown
    GenerateCliDocs {
        /// Output directory for the generated reference
        #[arg(short, long, default_value = "docs")]
        output_dir: String,

        /// Fail if the file on disk differs instead of rewriting it
        #[arg(long)]
        check: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir, check } => generate_cli_docs(&output_dir, check)?,
    }

    Ok(())
}

fn render() -> String {
    let markdown = clap_markdown::help_markdown::<ferry_cli::Cli>();
    format!(
        r#"# Ferry CLI Reference

Generated from the CLI source on {}.

Ferry replays a JSON or ND-JSON export against a GraphQL API in batches of
`updateOrCreate` mutations. Imported records are written to a checkpoint
(`.migrationstate` by default), so an interrupted import can simply be run
again.

## Quick Start

```bash
ferry import export.json --endpoint https://api.example.com/graphql --token "$TOKEN"
ferry checkpoint show
```

## Commands

{}

## Environment Variables

- `FERRY_ENDPOINT` - GraphQL endpoint used when `--endpoint` is absent
- `FERRY_TOKEN` - Bearer token used when `--token` is absent
- `FERRY_CHECKPOINT` - Checkpoint file (default: `.migrationstate`)
- `FERRY_API_TIMEOUT_SECS` - Per-request timeout (default: 300)
- `FERRY_BATCH_SIZE`, `FERRY_CONCURRENCY`, `FERRY_MAX_RETRIES` - Import tuning
- `FERRY_LOG_LEVEL`, `FERRY_LOG_OUTPUT`, `FERRY_LOG_FORMAT`, `FERRY_LOG_DIR` - Logging

## Exit Codes

| Code | Meaning |
|------|---------|
| 0 | Import finished |
| 1 | Invalid configuration or unexpected failure |
| 2 | Invalid command line |
| 3 | The source could not be read |
| 4 | One or more batches were rejected by the API |
| 5 | The checkpoint could not be read or written |

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    )
}

/// Everything except the generation date line
fn without_date(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.starts_with("Generated from the CLI source on"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn generate_cli_docs(output_dir: &str, check: bool) -> anyhow::Result<()> {
    let content = render();
    let output_path = PathBuf::from(output_dir);
    let file_path = output_path.join("cli-reference.md");

    if check {
        let existing = fs::read_to_string(&file_path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", file_path.display(), e))?;
        if without_date(&existing) != without_date(&content) {
            anyhow::bail!(
                "{} is out of date; run `cargo xtask generate-cli-docs`",
                file_path.display()
            );
        }
        println!("✅ {} is up to date", file_path.display());
        return Ok(());
    }

    fs::create_dir_all(&output_path)?;
    fs::write(&file_path, content)?;
    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
