//! Result ledger
//!
//! The set of `(typeName, oldId)` keys the API has confirmed, with the full
//! list of results in the order they arrived. Loaded once before a run and
//! persisted once after the dispatcher has drained, as gzip ND-JSON.

use crate::error::LedgerError;
use crate::types::{ApiResult, LedgerKey};
use ferry_common::{ndjson, CommonError};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Checkpoint file used when none is configured
pub const DEFAULT_CHECKPOINT_PATH: &str = ".migrationstate";

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    keys: HashSet<LedgerKey>,
    results: Vec<ApiResult>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from stored results, keeping the first of any repeats.
    pub fn from_results(results: impl IntoIterator<Item = ApiResult>) -> Self {
        let mut ledger = Self::new();
        let mut duplicates = 0usize;
        for result in results {
            if !ledger.record(result) {
                duplicates += 1;
            }
        }
        if duplicates > 0 {
            warn!(duplicates, "Checkpoint contained repeated keys; kept first occurrence");
        }
        ledger
    }

    /// Read the checkpoint at `path`. A missing file is an empty ledger.
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        let path = path.to_path_buf();
        let stored = tokio::task::spawn_blocking({
            let path = path.clone();
            move || ndjson::read_gz::<ApiResult>(&path)
        })
        .await??;

        match stored {
            Some(results) => {
                let ledger = Self::from_results(results);
                info!(path = %path.display(), records = ledger.len(), "Loaded checkpoint");
                Ok(ledger)
            }
            None => {
                debug!(path = %path.display(), "No checkpoint found, starting empty");
                Ok(Self::new())
            }
        }
    }

    /// Write every result to `path`, replacing any previous checkpoint
    /// atomically. Returns the number of results written.
    pub async fn persist(&self, path: &Path) -> Result<usize, LedgerError> {
        let path: PathBuf = path.to_path_buf();
        let results = self.results.clone();
        let written =
            tokio::task::spawn_blocking(move || ndjson::write_gz(&path, results.iter())).await??;
        Ok(written)
    }

    /// Delete the checkpoint at `path`. Returns whether a file was removed.
    pub async fn discard(path: &Path) -> Result<bool, LedgerError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CommonError::io(path, e).into()),
        }
    }

    pub fn contains(&self, key: &LedgerKey) -> bool {
        self.keys.contains(key)
    }

    /// Append `result` unless its key is already present.
    pub fn record(&mut self, result: ApiResult) -> bool {
        if self.keys.insert(result.key()) {
            self.results.push(result);
            true
        } else {
            false
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &LedgerKey> {
        self.keys.iter()
    }

    /// Copy of the key set, for seeding a dedup filter
    pub fn key_set(&self) -> HashSet<LedgerKey> {
        self.keys.clone()
    }

    pub fn results(&self) -> &[ApiResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Imported records per type name, sorted by name
    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.type_name.clone()).or_insert(0) += 1;
        }
        counts
    }
}
