//! `ferry checkpoint` command implementation
//!
//! Shows or deletes the file recording which records were imported.

use crate::config::Config;
use crate::error::Result;
use crate::progress::format_bytes;
use chrono::{DateTime, Local};
use colored::Colorize;
use ferry_ingest::Ledger;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Print per-type counts from the checkpoint
pub async fn show(checkpoint: Option<&PathBuf>) -> Result<()> {
    let path = Config::from_env()?.checkpoint(checkpoint);

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            println!("No checkpoint at {}; the next import starts from scratch.", path.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let ledger = Ledger::load(&path).await?;
    println!("{}", format!("Checkpoint {}", path.display()).cyan().bold());
    if let Ok(modified) = metadata.modified() {
        let modified: DateTime<Local> = modified.into();
        println!("  Written: {}", modified.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("  Size:    {}", format_bytes(metadata.len()));
    println!();

    let counts = ledger.counts_by_type();
    if counts.is_empty() {
        println!("No records imported yet.");
        return Ok(());
    }

    let width = counts.keys().map(|k| k.len()).max().unwrap_or(0);
    for (type_name, count) in &counts {
        println!("  {:<width$}  {}", type_name, count, width = width);
    }
    println!();
    println!("{} {} records imported", "✓".green(), ledger.len());
    Ok(())
}

/// Delete the checkpoint, asking first unless `yes` is set
pub async fn clear(checkpoint: Option<&PathBuf>, yes: bool) -> Result<()> {
    let path = Config::from_env()?.checkpoint(checkpoint);

    if !path.exists() {
        println!("No checkpoint at {}", path.display());
        return Ok(());
    }

    if !yes && !confirm(&path)? {
        println!("Checkpoint kept.");
        return Ok(());
    }

    Ledger::discard(&path).await?;
    println!("{} Removed {}", "✓".green(), path.display());
    Ok(())
}

fn confirm(path: &Path) -> Result<bool> {
    println!(
        "{}",
        format!(
            "This deletes {}; the next import will resend every record.",
            path.display()
        )
        .yellow()
    );
    print!("Continue? [y/N]: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
