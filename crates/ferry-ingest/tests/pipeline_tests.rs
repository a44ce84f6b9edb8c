//! Integration tests for the import pipeline
//!
//! These run full imports against an in-memory sink that echoes every record
//! back the way the API would, and validate:
//! - batch sizing and the trailing partial batch
//! - idempotent re-runs via the checkpoint
//! - dedup of repeated keys within one run
//! - the in-flight bound
//! - retry, partial import, and error precedence

use async_trait::async_trait;
use ferry_ingest::source::FileSource;
use ferry_ingest::{
    events, ApiResult, BatchDocument, DispatchError, ImportConfig, ImportError, ImportEvent,
    ImportPhase, ImportPipeline, ImportSummary, Ledger, LedgerKey, MutationSink, RetryPolicy,
    SourceError,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Sink that answers every record and tracks how it was called.
#[derive(Default)]
struct EchoSink {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts: Mutex<Vec<BatchDocument>>,
    /// batch sequence -> remaining failures
    failures: Mutex<HashMap<u64, u32>>,
    failure_status: u16,
    /// Answer only the first half of every batch
    half_answers: bool,
}

impl EchoSink {
    fn new() -> Self {
        Self::default()
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn failing(sequence: u64, times: u32, status: u16) -> Self {
        Self {
            failures: Mutex::new(HashMap::from([(sequence, times)])),
            failure_status: status,
            ..Self::default()
        }
    }

    fn answering_half() -> Self {
        Self {
            half_answers: true,
            ..Self::default()
        }
    }

    fn attempts(&self) -> Vec<BatchDocument> {
        self.attempts.lock().unwrap().clone()
    }

    fn batch_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.attempts().iter().map(|b| b.len()).collect();
        sizes.sort_unstable();
        sizes
    }
}

#[async_trait]
impl MutationSink for EchoSink {
    async fn send(&self, batch: &BatchDocument) -> Result<Vec<ApiResult>, DispatchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.attempts.lock().unwrap().push(batch.clone());

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&batch.sequence) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DispatchError::Status {
                    status: self.failure_status,
                    body: "upstream unavailable".into(),
                });
            }
        }

        let answered = if self.half_answers {
            batch.len() / 2
        } else {
            batch.len()
        };
        Ok(batch
            .entries
            .iter()
            .take(answered)
            .map(|entry| ApiResult {
                type_name: entry.type_name.clone(),
                id: format!("id-{}-{}", entry.type_name, entry.old_id),
                old_id: entry.old_id.clone(),
            })
            .collect())
    }
}

fn write_users(dir: &TempDir, count: usize) -> PathBuf {
    let users: Vec<serde_json::Value> = (0..count)
        .map(|i| serde_json::json!({ "oldId": i, "name": format!("user {}", i) }))
        .collect();
    let path = dir.path().join("export.json");
    std::fs::write(&path, serde_json::json!({ "User": users }).to_string())
        .expect("Failed to write test input");
    path
}

fn write_input(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test input");
    path
}

fn config(dir: &TempDir) -> ImportConfig {
    ImportConfig::builder()
        .checkpoint_path(dir.path().join(".migrationstate"))
        .retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        })
        .build()
}

async fn import(
    config: ImportConfig,
    sink: Arc<EchoSink>,
    input: &Path,
) -> Result<ImportSummary, ImportError> {
    ImportPipeline::new(config, sink, events::EventSender::disabled())
        .run(&FileSource::new(input))
        .await
}

async fn stored(dir: &TempDir) -> Ledger {
    Ledger::load(&dir.path().join(".migrationstate"))
        .await
        .expect("Failed to load checkpoint")
}

#[tokio::test]
async fn test_120_records_make_three_batches() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 120);
    let sink = Arc::new(EchoSink::new());

    let summary = import(config(&dir), sink.clone(), &input).await.unwrap();

    assert_eq!(summary.records_read, 120);
    assert_eq!(summary.records_skipped, 0);
    assert_eq!(summary.records_written, 120);
    assert_eq!(summary.batches_sent, 3);
    assert_eq!(sink.batch_sizes(), vec![20, 50, 50]);
    assert_eq!(stored(&dir).await.len(), 120);
}

#[tokio::test]
async fn test_second_run_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 120);

    import(config(&dir), Arc::new(EchoSink::new()), &input)
        .await
        .unwrap();

    let sink = Arc::new(EchoSink::new());
    let summary = import(config(&dir), sink.clone(), &input).await.unwrap();

    assert!(sink.attempts().is_empty());
    assert_eq!(summary.records_read, 120);
    assert_eq!(summary.records_skipped, 120);
    assert_eq!(summary.records_written, 0);
    assert_eq!(summary.batches_sent, 0);
    assert_eq!(stored(&dir).await.len(), 120);
}

#[tokio::test]
async fn test_aliases_are_unique_across_batches() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 175);
    let sink = Arc::new(EchoSink::new());

    import(config(&dir), sink.clone(), &input).await.unwrap();

    let aliases: Vec<String> = sink
        .attempts()
        .iter()
        .flat_map(|b| b.entries.iter().map(|e| e.alias.clone()))
        .collect();
    let unique: HashSet<&String> = aliases.iter().collect();
    assert_eq!(aliases.len(), 175);
    assert_eq!(unique.len(), 175);
}

#[tokio::test]
async fn test_duplicate_key_within_run_is_sent_once() {
    let dir = TempDir::new().unwrap();
    let input = write_input(
        &dir,
        "dupes.json",
        r#"{"User": [{"oldId": 1, "v": "first"}, {"oldId": 2}, {"oldId": 1, "v": "second"}]}"#,
    );
    let sink = Arc::new(EchoSink::new());

    let summary = import(config(&dir), sink.clone(), &input).await.unwrap();

    assert_eq!(summary.records_read, 3);
    assert_eq!(summary.records_skipped, 1);
    assert_eq!(summary.records_written, 2);
    let batches = sink.attempts();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[0].variables["obj0"]["v"], "first");
}

#[tokio::test]
async fn test_in_flight_batches_never_exceed_concurrency() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 1000);
    let sink = Arc::new(EchoSink::with_delay(Duration::from_millis(10)));
    let config = ImportConfig::builder()
        .checkpoint_path(dir.path().join(".migrationstate"))
        .concurrency(3)
        .build();

    let summary = import(config, sink.clone(), &input).await.unwrap();

    assert_eq!(summary.batches_sent, 20);
    let peak = sink.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak in flight was {}", peak);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 60);
    let sink = Arc::new(EchoSink::failing(0, 2, 503));

    let summary = import(config(&dir), sink.clone(), &input).await.unwrap();

    assert_eq!(summary.records_written, 60);
    assert_eq!(summary.batches_failed, 0);
    assert_eq!(sink.attempts().len(), 4);
}

#[tokio::test]
async fn test_exhausted_retries_report_partial_import() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 120);
    let sink = Arc::new(EchoSink::failing(1, u32::MAX, 500));

    let err = import(config(&dir), sink.clone(), &input)
        .await
        .unwrap_err();

    match err {
        ImportError::PartialImport { failed, summary } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].first_alias, "mut50");
            assert_eq!(failed[0].last_alias, "mut99");
            assert_eq!(failed[0].records, 50);
            assert_eq!(summary.batches_sent, 3);
            assert_eq!(summary.batches_failed, 1);
            assert_eq!(summary.records_written, 70);
        }
        other => panic!("expected partial import, got {:?}", other),
    }

    let ledger = stored(&dir).await;
    assert_eq!(ledger.len(), 70);
    assert!(ledger.contains(&LedgerKey::new("User", "49")));
    assert!(!ledger.contains(&LedgerKey::new("User", "50")));
    assert!(!ledger.contains(&LedgerKey::new("User", "99")));

    // A later run picks up exactly the records that failed.
    let retry = Arc::new(EchoSink::new());
    let summary = import(config(&dir), retry.clone(), &input).await.unwrap();
    assert_eq!(summary.records_skipped, 70);
    assert_eq!(summary.records_written, 50);
    assert_eq!(stored(&dir).await.len(), 120);
}

#[tokio::test]
async fn test_malformed_records_are_skipped_and_counted() {
    let dir = TempDir::new().unwrap();
    let input = write_input(
        &dir,
        "mixed.json",
        r#"{"User": [{"oldId": 1}, {"name": "no id"}, "not a record", {"oldId": 2}], "bad-type": [{"oldId": 3}]}"#,
    );
    let sink = Arc::new(EchoSink::new());

    let summary = import(config(&dir), sink.clone(), &input).await.unwrap();

    assert_eq!(summary.records_malformed, 3);
    assert_eq!(summary.records_read, 2);
    assert_eq!(summary.records_written, 2);
    assert!(sink.attempts()[0].document.contains("updateOrCreateUser"));
}

#[tokio::test]
async fn test_ndjson_input() {
    let dir = TempDir::new().unwrap();
    let input = write_input(
        &dir,
        "export.ndjson",
        "{\"typeName\":\"User\",\"record\":{\"oldId\":\"u1\"}}\n\
         this line is garbage\n\
         {\"typeName\":\"Post\",\"record\":{\"oldId\":\"p1\",\"author\":\"u1\"}}\n",
    );
    let sink = Arc::new(EchoSink::new());

    let summary = import(config(&dir), sink.clone(), &input).await.unwrap();

    assert_eq!(summary.records_written, 2);
    assert_eq!(summary.records_malformed, 1);
    let counts = stored(&dir).await.counts_by_type();
    assert_eq!(counts.get("Post"), Some(&1));
    assert_eq!(counts.get("User"), Some(&1));
}

#[tokio::test]
async fn test_source_failure_keeps_delivered_records() {
    let dir = TempDir::new().unwrap();
    let input = write_input(
        &dir,
        "broken.json",
        r#"{"User": [{"oldId": 1}, {"oldId": 2}], "Post": "oops"}"#,
    );
    let sink = Arc::new(EchoSink::new());

    let err = import(config(&dir), sink.clone(), &input)
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("could not read source"));
    match err {
        ImportError::SourceInterrupted {
            source: SourceError::Structure { .. },
            failed,
            summary,
        } => {
            assert!(failed.is_empty());
            assert_eq!(summary.records_read, 2);
            assert_eq!(summary.records_written, 2);
        }
        other => panic!("expected interrupted source, got {:?}", other),
    }
    assert_eq!(stored(&dir).await.len(), 2);
}

#[tokio::test]
async fn test_unanswered_records_report_partial_import() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 100);
    let sink = Arc::new(EchoSink::answering_half());

    let err = import(config(&dir), sink.clone(), &input)
        .await
        .unwrap_err();

    match err {
        ImportError::PartialImport { failed, summary } => {
            assert_eq!(summary.records_read, 100);
            assert_eq!(summary.records_written, 50);
            assert_eq!(summary.batches_sent, 2);
            assert_eq!(summary.batches_failed, 2);
            assert_eq!(failed.len(), 2);
            assert!(failed.iter().all(|f| f.records == 25));
            let mut ranges: Vec<(String, String)> = failed
                .iter()
                .map(|f| (f.first_alias.clone(), f.last_alias.clone()))
                .collect();
            ranges.sort();
            assert_eq!(
                ranges,
                vec![
                    ("mut25".to_string(), "mut49".to_string()),
                    ("mut75".to_string(), "mut99".to_string()),
                ]
            );
            assert!(failed[0].error.contains("no result for 25 of 50 records"));
        }
        other => panic!("expected partial import, got {:?}", other),
    }

    // Answered records are kept; the rest go out again next run.
    assert_eq!(stored(&dir).await.len(), 50);
    let retry = Arc::new(EchoSink::new());
    let summary = import(config(&dir), retry.clone(), &input).await.unwrap();
    assert_eq!(summary.records_skipped, 50);
    assert_eq!(summary.records_written, 50);
}

#[tokio::test]
async fn test_unopenable_source_sends_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(EchoSink::new());

    let err = import(config(&dir), sink.clone(), &dir.path().join("missing.json"))
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Source(SourceError::Open { .. })));
    assert!(sink.attempts().is_empty());
    assert!(!dir.path().join(".migrationstate").exists());
}

#[tokio::test]
async fn test_unwritable_checkpoint_is_a_persistence_error() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 10);
    let sink = Arc::new(EchoSink::new());
    let config = ImportConfig::builder()
        .checkpoint_path(dir.path().join("no-such-dir").join(".migrationstate"))
        .build();

    let err = import(config, sink.clone(), &input).await.unwrap_err();

    assert!(matches!(err, ImportError::Persistence(_)));
    assert!(err.to_string().starts_with("could not persist checkpoint"));
    assert_eq!(sink.attempts().len(), 1);
}

#[tokio::test]
async fn test_corrupt_checkpoint_stops_before_sending() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 10);
    std::fs::write(dir.path().join(".migrationstate"), b"not gzip at all").unwrap();
    let sink = Arc::new(EchoSink::new());

    let err = import(config(&dir), sink.clone(), &input)
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::CheckpointLoad(_)));
    assert!(sink.attempts().is_empty());
}

#[tokio::test]
async fn test_progress_events() {
    let dir = TempDir::new().unwrap();
    let input = write_users(&dir, 120);
    let (tx, mut rx) = events::channel();

    let pipeline = ImportPipeline::new(config(&dir), Arc::new(EchoSink::new()), tx);
    pipeline.run(&FileSource::new(&input)).await.unwrap();
    drop(pipeline);

    let mut received = Vec::new();
    while let Some(event) = rx.recv().await {
        received.push(event);
    }

    assert!(received
        .iter()
        .any(|e| matches!(e, ImportEvent::SourceOpened { size: Some(n) } if *n > 0)));
    assert!(received
        .iter()
        .any(|e| matches!(e, ImportEvent::Tick { .. })));
    assert!(received.contains(&ImportEvent::ReadComplete {
        total: 120,
        skipped: 0
    }));
    assert!(received.contains(&ImportEvent::WriteComplete { total: 120 }));

    let phases: Vec<ImportPhase> = received
        .iter()
        .filter_map(|e| match e {
            ImportEvent::Phase(phase) => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(phases.first(), Some(&ImportPhase::Idle));
    assert_eq!(phases.last(), Some(&ImportPhase::Done));
    assert!(phases.contains(&ImportPhase::Flushing));
}
