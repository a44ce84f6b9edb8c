//! Import pipeline assembly
//!
//! ```text
//! reader task            planner task                     calling task
//! source -> normalize -> dedup -> mutation -> batcher -> dispatcher (K in flight) -> ledger
//!        records (bounded)                  batches (bounded, K)
//! ```
//!
//! Both links are bounded channels, so a slow API fills the batch channel,
//! stalls the planner, fills the record channel and finally stalls reading.
//! The dispatcher polls every in-flight request from one task and is the
//! only writer of the ledger.

use crate::batch::{BatchDocument, BatchEntry, Batcher};
use crate::config::ImportConfig;
use crate::dedup::DedupFilter;
use crate::dispatch::{send_with_retry, MutationSink};
use crate::error::{DispatchError, FailedBatch, ImportError, SourceError};
use crate::events::{EventSender, ImportEvent, ImportPhase};
use crate::ledger::Ledger;
use crate::mutation::MutationBuilder;
use crate::normalize::{self, RecordFormat, RecordStream};
use crate::source::{self, RecordSource};
use crate::types::{ApiResult, LedgerKey, NormalizedRecord};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    /// Well-formed records read, skipped ones included
    pub records_read: u64,
    /// Records dropped as already imported
    pub records_skipped: u64,
    pub records_malformed: u64,
    /// Records the API confirmed in this run
    pub records_written: u64,
    /// Batches dispatched, failed ones included
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub elapsed: Duration,
}

const MAX_LISTED_ALIASES: usize = 5;

struct ReaderReport {
    malformed: u64,
    failure: Option<SourceError>,
}

struct PlannerReport {
    read: u64,
    skipped: u64,
}

pub struct ImportPipeline {
    config: ImportConfig,
    sink: Arc<dyn MutationSink>,
    events: EventSender,
}

impl ImportPipeline {
    pub fn new(config: ImportConfig, sink: Arc<dyn MutationSink>, events: EventSender) -> Self {
        Self {
            config,
            sink,
            events,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    fn enter(&self, phase: ImportPhase) {
        debug!(phase = phase.as_str(), "Import phase");
        self.events.emit(ImportEvent::Phase(phase));
    }

    /// Run one import of `source` to completion.
    ///
    /// Failures to load the checkpoint or open the source end the run before
    /// anything is sent. Any later failure still lets delivered records be
    /// dispatched and the checkpoint be persisted; the error is returned
    /// after that, persistence failures first, then source failures
    /// ([`ImportError::SourceInterrupted`]), then failed batches. Both of the
    /// latter carry the run's summary.
    pub async fn run(&self, source: &dyn RecordSource) -> Result<ImportSummary, ImportError> {
        let started = Instant::now();
        self.enter(ImportPhase::Idle);

        let checkpoint = &self.config.checkpoint_path;
        let mut ledger = Ledger::load(checkpoint)
            .await
            .map_err(ImportError::CheckpointLoad)?;
        self.enter(ImportPhase::LedgerLoaded);

        let format = self
            .config
            .format
            .unwrap_or_else(|| RecordFormat::infer(source.location()));
        let size = source.size().await;
        let bytes = source.open().await?;
        self.events.emit(ImportEvent::SourceOpened { size });
        info!(
            source = source.location(),
            %format,
            size,
            known = ledger.len(),
            "Import started"
        );

        self.enter(ImportPhase::Streaming);

        let records = normalize::normalize(
            source::counted(bytes, self.events.clone()),
            format.framer(),
        );
        let concurrency = self.config.concurrency.max(1);
        let (record_tx, record_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (batch_tx, batch_rx) = mpsc::channel(concurrency);

        let reader = tokio::spawn(read_records(records, record_tx, self.events.clone()));
        let planner = tokio::spawn(plan_batches(
            record_rx,
            batch_tx,
            DedupFilter::new(ledger.key_set(), self.events.clone()),
            Batcher::new(self.config.effective_batch_size()),
            self.events.clone(),
        ));

        let mut summary = ImportSummary::default();
        let failed = self
            .dispatch(batch_rx, concurrency, &mut ledger, &mut summary)
            .await;

        let planned = planner
            .await
            .map_err(|e| ImportError::Internal(format!("planner task failed: {}", e)))?;
        let read = reader
            .await
            .map_err(|e| ImportError::Internal(format!("reader task failed: {}", e)))?;

        summary.records_read = planned.read;
        summary.records_skipped = planned.skipped;
        summary.records_malformed = read.malformed;
        self.events.emit(ImportEvent::WriteComplete {
            total: summary.records_written,
        });

        self.enter(ImportPhase::PersistingLedger);
        let persisted = ledger.persist(checkpoint).await;
        summary.elapsed = started.elapsed();
        self.enter(ImportPhase::Done);

        match persisted {
            Ok(rows) => info!(path = %checkpoint.display(), rows, "Checkpoint persisted"),
            Err(e) => return Err(ImportError::Persistence(e)),
        }

        info!(
            read = summary.records_read,
            skipped = summary.records_skipped,
            malformed = summary.records_malformed,
            written = summary.records_written,
            batches = summary.batches_sent,
            failed = summary.batches_failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Import finished"
        );

        if let Some(source) = read.failure {
            return Err(ImportError::SourceInterrupted {
                source,
                failed,
                summary,
            });
        }
        if !failed.is_empty() {
            return Err(ImportError::PartialImport { failed, summary });
        }
        Ok(summary)
    }

    /// Send batches with at most `concurrency` in flight and fold the
    /// results into the ledger as they complete, in any order. A batch the
    /// API answered only in part counts as failed for the missing records.
    async fn dispatch(
        &self,
        batches: mpsc::Receiver<BatchDocument>,
        concurrency: usize,
        ledger: &mut Ledger,
        summary: &mut ImportSummary,
    ) -> Vec<FailedBatch> {
        let mut failed = Vec::new();
        let completions = ReceiverStream::new(batches)
            .map(|batch| {
                let sink = Arc::clone(&self.sink);
                let retry = self.config.retry.clone();
                async move {
                    let outcome = send_with_retry(sink.as_ref(), &batch, &retry).await;
                    (batch, outcome)
                }
            })
            .buffer_unordered(concurrency);
        let mut completions = std::pin::pin!(completions);

        while let Some((batch, outcome)) = completions.next().await {
            summary.batches_sent += 1;
            match outcome {
                Ok(results) => {
                    let unanswered = unanswered_entries(&batch, &results);
                    let written = record_results(ledger, results);
                    summary.records_written += written;
                    debug!(batch = batch.sequence, records = batch.len(), written, "Batch written");
                    self.events.emit(ImportEvent::WriteCount {
                        total: summary.records_written,
                    });
                    if !unanswered.is_empty() {
                        summary.batches_failed += 1;
                        failed.push(self.batch_incomplete(&batch, &unanswered));
                    }
                }
                Err(err) => {
                    summary.batches_failed += 1;
                    failed.push(self.batch_failed(&batch, &err));
                }
            }
        }

        failed
    }

    fn batch_failed(&self, batch: &BatchDocument, err: &DispatchError) -> FailedBatch {
        self.report_failure(
            batch,
            FailedBatch {
                first_alias: batch.first_alias().to_string(),
                last_alias: batch.last_alias().to_string(),
                records: batch.len(),
                error: err.to_string(),
            },
        )
    }

    fn batch_incomplete(&self, batch: &BatchDocument, unanswered: &[&BatchEntry]) -> FailedBatch {
        let aliases: Vec<&str> = unanswered.iter().map(|e| e.alias.as_str()).collect();
        let mut listed = aliases
            .iter()
            .take(MAX_LISTED_ALIASES)
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        if aliases.len() > MAX_LISTED_ALIASES {
            listed.push_str(", ...");
        }
        self.report_failure(
            batch,
            FailedBatch {
                first_alias: aliases.first().copied().unwrap_or_default().to_string(),
                last_alias: aliases.last().copied().unwrap_or_default().to_string(),
                records: unanswered.len(),
                error: format!(
                    "API returned no result for {} of {} records ({})",
                    unanswered.len(),
                    batch.len(),
                    listed
                ),
            },
        )
    }

    fn report_failure(&self, batch: &BatchDocument, failure: FailedBatch) -> FailedBatch {
        warn!(
            batch = batch.sequence,
            first_alias = %failure.first_alias,
            last_alias = %failure.last_alias,
            records = failure.records,
            error = %failure.error,
            "Batch failed; its records stay unimported"
        );
        self.events.emit(ImportEvent::BatchFailed {
            first_alias: failure.first_alias.clone(),
            last_alias: failure.last_alias.clone(),
            records: failure.records,
            error: failure.error.clone(),
        });
        failure
    }
}

/// Entries of `batch` with no matching result
fn unanswered_entries<'a>(batch: &'a BatchDocument, results: &[ApiResult]) -> Vec<&'a BatchEntry> {
    let answered: HashSet<LedgerKey> = results.iter().map(ApiResult::key).collect();
    batch
        .entries
        .iter()
        .filter(|entry| {
            !answered.contains(&LedgerKey::new(
                entry.type_name.as_str(),
                entry.old_id.clone(),
            ))
        })
        .collect()
}

fn record_results(ledger: &mut Ledger, results: Vec<ApiResult>) -> u64 {
    results
        .into_iter()
        .map(|result| ledger.record(result))
        .filter(|&added| added)
        .count() as u64
}

/// Reader stage: normalize the source and forward well-formed records.
async fn read_records(
    mut records: RecordStream,
    tx: mpsc::Sender<NormalizedRecord>,
    events: EventSender,
) -> ReaderReport {
    let mut report = ReaderReport {
        malformed: 0,
        failure: None,
    };

    while let Some(item) = records.next().await {
        match item {
            Ok(Ok(record)) => {
                if tx.send(record).await.is_err() {
                    break;
                }
            }
            Ok(Err(bad)) => {
                report.malformed += 1;
                warn!(ordinal = bad.ordinal, reason = %bad.reason, "Skipping malformed record");
                events.emit(ImportEvent::MalformedRecord {
                    ordinal: bad.ordinal,
                    reason: bad.reason,
                });
            }
            Err(err) => {
                warn!(error = %err, "Source failed; finishing with records read so far");
                events.message(format!("Source failed: {}", err));
                report.failure = Some(err);
                break;
            }
        }
    }

    report
}

/// Planner stage: dedup, build fragments, and cut batches.
async fn plan_batches(
    mut rx: mpsc::Receiver<NormalizedRecord>,
    tx: mpsc::Sender<BatchDocument>,
    mut filter: DedupFilter,
    mut batcher: Batcher,
    events: EventSender,
) -> PlannerReport {
    let mut builder = MutationBuilder::new();

    while let Some(record) = rx.recv().await {
        let Some(record) = filter.admit(record) else {
            continue;
        };
        if let Some(batch) = batcher.push(builder.build(record)) {
            if tx.send(batch).await.is_err() {
                break;
            }
        }
    }

    filter.finish();
    debug!(phase = ImportPhase::Flushing.as_str(), "Import phase");
    events.emit(ImportEvent::Phase(ImportPhase::Flushing));
    if let Some(batch) = batcher.close() {
        // The dispatcher only goes away once this sender is dropped.
        let _ = tx.send(batch).await;
    }
    debug!(
        fragments = builder.issued(),
        batches = batcher.emitted(),
        "Planner finished"
    );

    PlannerReport {
        read: filter.total(),
        skipped: filter.skipped(),
    }
}
