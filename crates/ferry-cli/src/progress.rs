//! Progress bars for `ferry import`
//!
//! A reporter task turns the pipeline's events into three bars: bytes read,
//! records read (with the skipped count), and records imported. Bars are
//! drawn on stderr and hidden automatically when it is not a terminal.

use colored::Colorize;
use ferry_ingest::{ImportEvent, ImportPhase};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

const BYTES_TEMPLATE: &str =
    "{prefix:>10} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const STREAM_TEMPLATE: &str = "{prefix:>10} {spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec})";
const COUNT_TEMPLATE: &str = "{prefix:>10} {spinner:.green} [{elapsed_precise}] {pos} {msg}";
const TOTAL_TEMPLATE: &str =
    "{prefix:>10} [{elapsed_precise}] [{wide_bar:.green/blue}] {pos}/{len} {msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

struct Bars {
    multi: MultiProgress,
    reading: ProgressBar,
    records: ProgressBar,
    imported: ProgressBar,
    malformed: u64,
    skipped: u64,
}

impl Bars {
    fn new() -> Self {
        let multi = MultiProgress::new();
        let reading = multi.add(ProgressBar::no_length());
        reading.set_style(style(STREAM_TEMPLATE));
        reading.set_prefix("Reading");

        let records = multi.add(ProgressBar::no_length());
        records.set_style(style(COUNT_TEMPLATE));
        records.set_prefix("Records");

        let imported = multi.add(ProgressBar::no_length());
        imported.set_style(style(COUNT_TEMPLATE));
        imported.set_prefix("Imported");

        for bar in [&reading, &records, &imported] {
            bar.enable_steady_tick(Duration::from_millis(120));
        }

        Self {
            multi,
            reading,
            records,
            imported,
            malformed: 0,
            skipped: 0,
        }
    }

    fn records_message(&self) -> String {
        if self.malformed > 0 {
            format!("({} skipped, {} malformed)", self.skipped, self.malformed)
        } else {
            format!("({} skipped)", self.skipped)
        }
    }

    fn apply(&mut self, event: ImportEvent) {
        match event {
            ImportEvent::SourceOpened { size: Some(size) } => {
                self.reading.set_style(style(BYTES_TEMPLATE));
                self.reading.set_length(size);
            }
            ImportEvent::SourceOpened { size: None } => {}
            ImportEvent::Tick { bytes } => self.reading.inc(bytes),
            ImportEvent::ReadCount { total, skipped }
            | ImportEvent::SkippedRecord { total, skipped } => {
                self.skipped = skipped;
                self.records.set_position(total);
                self.records.set_message(self.records_message());
            }
            ImportEvent::MalformedRecord { .. } => {
                self.malformed += 1;
                self.records.set_message(self.records_message());
            }
            ImportEvent::ReadComplete { total, skipped } => {
                self.skipped = skipped;
                self.reading.finish();
                self.records.set_position(total);
                self.records.finish_with_message(self.records_message());
                // Only records that passed dedup can be written.
                self.imported.set_style(style(TOTAL_TEMPLATE));
                self.imported.set_length(total.saturating_sub(skipped));
            }
            ImportEvent::WriteCount { total } => self.imported.set_position(total),
            ImportEvent::WriteComplete { total } => {
                self.imported.set_position(total);
                self.imported.finish();
            }
            ImportEvent::BatchFailed {
                first_alias,
                last_alias,
                records,
                error,
            } => {
                let _ = self.multi.println(format!(
                    "{} Batch {}..{} ({} records) failed: {}",
                    "✗".red(),
                    first_alias,
                    last_alias,
                    records,
                    error
                ));
            }
            ImportEvent::Phase(ImportPhase::PersistingLedger) => {
                self.imported.set_message("saving checkpoint");
            }
            ImportEvent::Phase(_) => {}
            ImportEvent::Message(text) => {
                let _ = self.multi.println(text);
            }
        }
    }

    fn finish(self) {
        for bar in [self.reading, self.records, self.imported] {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

/// Draw progress until every event sender is dropped.
pub fn spawn_reporter(mut events: UnboundedReceiver<ImportEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bars = Bars::new();
        while let Some(event) = events.recv().await {
            bars.apply(event);
        }
        bars.finish();
    })
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_bars_follow_events() {
        let mut bars = Bars::new();
        bars.apply(ImportEvent::SourceOpened { size: Some(1000) });
        bars.apply(ImportEvent::Tick { bytes: 400 });
        bars.apply(ImportEvent::SkippedRecord { total: 1, skipped: 1 });
        bars.apply(ImportEvent::ReadCount { total: 3, skipped: 1 });
        bars.apply(ImportEvent::MalformedRecord {
            ordinal: 3,
            reason: "no oldId".into(),
        });
        bars.apply(ImportEvent::ReadComplete { total: 3, skipped: 1 });
        bars.apply(ImportEvent::WriteCount { total: 2 });

        assert_eq!(bars.reading.length(), Some(1000));
        assert_eq!(bars.reading.position(), 400);
        assert_eq!(bars.records.position(), 3);
        assert_eq!(bars.imported.length(), Some(2));
        assert_eq!(bars.imported.position(), 2);
        assert_eq!(bars.records_message(), "(1 skipped, 1 malformed)");
        bars.finish();
    }

    #[tokio::test]
    async fn test_reporter_stops_when_senders_drop() {
        let (tx, rx) = ferry_ingest::events::channel();
        let reporter = spawn_reporter(rx);
        tx.emit(ImportEvent::WriteComplete { total: 0 });
        drop(tx);
        reporter.await.unwrap();
    }
}
