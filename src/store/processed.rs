//! Idempotency guard: source ids that finished successfully.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::snapshot::SnapshotFile;

/// Persisted `source_id -> true` map
#[derive(Debug)]
pub struct ProcessedSet {
    file: SnapshotFile<BTreeMap<String, bool>>,
    entries: Mutex<BTreeMap<String, bool>>,
}

impl ProcessedSet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: SnapshotFile::new(path),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create the set and load its snapshot
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let set = Self::new(path);
        set.reload().await;
        set
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Replace the in-memory set with the persisted one
    pub async fn reload(&self) -> usize {
        let loaded = self.file.load_or_default().await;
        let mut entries = self.entries.lock().await;
        *entries = loaded;
        info!(processed = entries.len(), "Processed set loaded");
        entries.len()
    }

    pub async fn contains(&self, source_id: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(source_id)
            .copied()
            .unwrap_or(false)
    }

    /// Record a terminal success
    pub async fn mark_processed(&self, source_id: &str) {
        let mut entries = self.entries.lock().await;
        entries.insert(source_id.to_string(), true);
        self.persist(&entries).await;
    }

    /// Forget a source id so the next scan picks it up again
    pub async fn purge(&self, source_id: &str) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.remove(source_id).is_none() {
            return false;
        }
        self.persist(&entries).await;
        true
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn persist(&self, entries: &BTreeMap<String, bool>) {
        if let Err(e) = self.file.save(entries).await {
            warn!(
                path = %self.path().display(),
                error = %e,
                "Failed to persist processed set, keeping in-memory state"
            );
        }
    }
}
