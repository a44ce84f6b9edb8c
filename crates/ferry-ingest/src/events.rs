//! Progress events
//!
//! Every stage gets an [`EventSender`] at construction and reports what it
//! observes. Events are informational only: sending never blocks, never
//! fails, and a pipeline with no listener behaves identically.

use tokio::sync::mpsc;

/// Lifecycle of one import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    LedgerLoaded,
    Streaming,
    /// Upstream ended; the trailing partial batch is being flushed
    Flushing,
    PersistingLedger,
    Done,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Idle => "idle",
            ImportPhase::LedgerLoaded => "ledger_loaded",
            ImportPhase::Streaming => "streaming",
            ImportPhase::Flushing => "flushing",
            ImportPhase::PersistingLedger => "persisting_ledger",
            ImportPhase::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    /// Source opened; `size` is known for local files only
    SourceOpened { size: Option<u64> },
    /// Raw bytes consumed from the source
    Tick { bytes: u64 },
    /// A new record passed the dedup filter
    ReadCount { total: u64, skipped: u64 },
    /// A record was dropped as already imported
    SkippedRecord { total: u64, skipped: u64 },
    /// A record failed normalization and was skipped
    MalformedRecord { ordinal: u64, reason: String },
    /// Upstream is exhausted
    ReadComplete { total: u64, skipped: u64 },
    /// A batch failed for good
    BatchFailed {
        first_alias: String,
        last_alias: String,
        records: usize,
        error: String,
    },
    /// Records confirmed by the API so far
    WriteCount { total: u64 },
    WriteComplete { total: u64 },
    Phase(ImportPhase),
    Message(String),
}

/// Cloneable handle stages use to publish events.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<ImportEvent>>,
}

impl EventSender {
    /// A sender with no listener; every event is discarded.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ImportEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver just means nobody is watching.
            let _ = tx.send(event);
        }
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(ImportEvent::Message(text.into()));
    }
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<ImportEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx: Some(tx) }, rx)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_sender_discards() {
        let events = EventSender::disabled();
        events.emit(ImportEvent::Tick { bytes: 10 });
        events.message("nobody listens");
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (events, rx) = channel();
        drop(rx);
        events.emit(ImportEvent::WriteCount { total: 1 });
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (events, mut rx) = channel();
        events.emit(ImportEvent::Phase(ImportPhase::Streaming));
        events.message("hello");
        drop(events);

        assert_eq!(
            rx.recv().await,
            Some(ImportEvent::Phase(ImportPhase::Streaming))
        );
        assert_eq!(rx.recv().await, Some(ImportEvent::Message("hello".into())));
        assert_eq!(rx.recv().await, None);
    }
}
