//! Batcher
//!
//! Collects fragments into batch documents of `B = max(requested, 50)`
//! fragments. [`Batcher::close`] is the only flush: it hands out the trailing
//! partial batch once and `None` on every later call.

use crate::mutation::MutationFragment;
use crate::types::ExternalId;
use serde_json::{Map, Value};
use tracing::warn;

/// Smallest batch the importer will send
pub const MIN_BATCH_SIZE: usize = 50;

/// Which record an alias in a batch stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub alias: String,
    pub type_name: String,
    pub old_id: ExternalId,
}

/// One wire-level request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDocument {
    /// Zero-based position in emission order
    pub sequence: u64,
    pub document: String,
    pub variables: Map<String, Value>,
    pub entries: Vec<BatchEntry>,
}

impl BatchDocument {
    fn assemble(sequence: u64, fragments: Vec<MutationFragment>) -> Self {
        let declarations: Vec<String> = fragments
            .iter()
            .map(|f| format!("${}: Create{}!", f.variable_name, f.type_name))
            .collect();
        let selections: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        let document = format!(
            "mutation({}) {{ {} }}",
            declarations.join(", "),
            selections.join(" ")
        );

        let mut variables = Map::with_capacity(fragments.len());
        let mut entries = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            entries.push(BatchEntry {
                alias: fragment.alias,
                type_name: fragment.type_name.as_str().to_string(),
                old_id: fragment.old_id,
            });
            variables.insert(fragment.variable_name, fragment.variable_value);
        }

        Self {
            sequence,
            document,
            variables,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_alias(&self) -> &str {
        self.entries.first().map(|e| e.alias.as_str()).unwrap_or("")
    }

    pub fn last_alias(&self) -> &str {
        self.entries.last().map(|e| e.alias.as_str()).unwrap_or("")
    }
}

#[derive(Debug)]
pub struct Batcher {
    threshold: usize,
    pending: Vec<MutationFragment>,
    emitted: u64,
    closed: bool,
}

impl Batcher {
    /// Requests below [`MIN_BATCH_SIZE`] are raised to it.
    pub fn new(requested: usize) -> Self {
        let threshold = requested.max(MIN_BATCH_SIZE);
        Self {
            threshold,
            pending: Vec::with_capacity(threshold),
            emitted: 0,
            closed: false,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Add a fragment; returns a full batch when the threshold is reached.
    ///
    /// Pushing after [`close`](Self::close) is a caller bug. The fragment is
    /// then sent as a batch of its own so that it is not lost.
    pub fn push(&mut self, fragment: MutationFragment) -> Option<BatchDocument> {
        if self.closed {
            warn!(alias = %fragment.alias, "Fragment pushed after batcher was closed");
            return Some(self.seal(vec![fragment]));
        }

        self.pending.push(fragment);
        if self.pending.len() >= self.threshold {
            let fragments = std::mem::replace(&mut self.pending, Vec::with_capacity(self.threshold));
            Some(self.seal(fragments))
        } else {
            None
        }
    }

    /// Flush the trailing partial batch. Idempotent.
    pub fn close(&mut self) -> Option<BatchDocument> {
        if self.closed {
            return None;
        }
        self.closed = true;

        if self.pending.is_empty() {
            None
        } else {
            let fragments = std::mem::take(&mut self.pending);
            Some(self.seal(fragments))
        }
    }

    /// Batches handed out so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn seal(&mut self, fragments: Vec<MutationFragment>) -> BatchDocument {
        let batch = BatchDocument::assemble(self.emitted, fragments);
        self.emitted += 1;
        batch
    }
}
