//! Dedup filter
//!
//! Drops records whose `(typeName, oldId)` is already known. The key set is
//! seeded from the ledger and every admitted key is added right away, so a
//! repeated key later in the same input is skipped as well. The ledger
//! itself only ever learns keys the API confirmed.

use crate::events::{EventSender, ImportEvent};
use crate::types::{LedgerKey, NormalizedRecord};
use std::collections::HashSet;
use tracing::trace;

pub struct DedupFilter {
    seen: HashSet<LedgerKey>,
    total: u64,
    skipped: u64,
    events: EventSender,
}

impl DedupFilter {
    pub fn new(seen: HashSet<LedgerKey>, events: EventSender) -> Self {
        Self {
            seen,
            total: 0,
            skipped: 0,
            events,
        }
    }

    /// Pass `record` through when its key is new, drop it otherwise.
    pub fn admit(&mut self, record: NormalizedRecord) -> Option<NormalizedRecord> {
        self.total += 1;

        if self.seen.insert(record.key()) {
            self.events.emit(ImportEvent::ReadCount {
                total: self.total,
                skipped: self.skipped,
            });
            Some(record)
        } else {
            self.skipped += 1;
            trace!(key = %record.key(), "Skipping already imported record");
            self.events.emit(ImportEvent::SkippedRecord {
                total: self.total,
                skipped: self.skipped,
            });
            None
        }
    }

    /// Every well-formed record seen so far, skipped ones included
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Announce end of stream.
    pub fn finish(&self) {
        self.events.emit(ImportEvent::ReadComplete {
            total: self.total,
            skipped: self.skipped,
        });
    }
}
