//! Artifacts whose upload failed, persisted until a replay succeeds.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::snapshot::SnapshotFile;
use crate::domain::ErrorRecord;

/// Persisted list of error records, at most one per source id
#[derive(Debug)]
pub struct ErrorStore {
    file: SnapshotFile<Vec<ErrorRecord>>,
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: SnapshotFile::new(path),
            records: Mutex::new(Vec::new()),
        }
    }

    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        store.reload().await;
        store
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub async fn reload(&self) -> usize {
        let loaded = self.file.load_or_default().await;
        let mut records = self.records.lock().await;
        *records = loaded;
        info!(records = records.len(), "Error store loaded");
        records.len()
    }

    /// Store a record, replacing any earlier one for the same source id
    pub async fn record(&self, record: ErrorRecord) {
        let mut records = self.records.lock().await;
        records.retain(|r| r.source_id != record.source_id);
        warn!(
            source_id = %record.source_id,
            artifact = %record.artifact_local_ref.display(),
            "Artifact upload deferred to error store"
        );
        records.push(record);
        self.persist(&records).await;
    }

    pub async fn remove(&self, source_id: &str) -> bool {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| r.source_id != source_id);
        if records.len() == before {
            return false;
        }
        self.persist(&records).await;
        true
    }

    pub async fn contains(&self, source_id: &str) -> bool {
        self.records
            .lock()
            .await
            .iter()
            .any(|r| r.source_id == source_id)
    }

    /// Copy of all records in insertion order
    pub async fn list(&self) -> Vec<ErrorRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    async fn persist(&self, records: &[ErrorRecord]) {
        let snapshot = records.to_vec();
        if let Err(e) = self.file.save(&snapshot).await {
            warn!(
                path = %self.path().display(),
                error = %e,
                "Failed to persist error store, keeping in-memory state"
            );
        }
    }
}
