//! Ingestion pipeline: remote item → local audio → uploaded artifact → job.
//!
//! Items already processed, queued, or awaiting replay are skipped before any
//! network or disk I/O. When the upload is the step that fails, the extracted
//! audio is kept on disk and an [`ErrorRecord`] is written so a later replay
//! only has to retry the upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::labels::LabelCounter;
use crate::adapters::{ArtifactMaterializer, ArtifactUploader, ItemSource, RemoteItem};
use crate::domain::{ErrorRecord, Job};
use crate::store::{DurableQueue, ErrorStore, ProcessedSet};

/// Hex characters of the source-id digest used to prefix temp files
const TEMP_PREFIX_LEN: usize = 12;

/// Per-item ingestion failures; none of them mutate the stores
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to prepare temp directory {path}: {source}")]
    TempDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download of {source_id} failed: {message}")]
    Download { source_id: String, message: String },

    #[error("Audio extraction for {source_id} failed: {message}")]
    Materialize { source_id: String, message: String },
}

/// What happened to one discovered item
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Enqueued,
    AlreadyQueued,
    AlreadyProcessed,

    /// An error record for this item is waiting for replay
    AwaitingReplay,

    TooLarge { size: u64 },

    /// Upload failed; the artifact went to the error store
    Deferred,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Folder to enumerate
    pub root: String,

    /// Items larger than this are skipped
    pub max_size_bytes: u64,

    /// Only files whose MIME type starts with this are ingested
    pub mime_prefix: String,

    /// Where downloads and extracted audio live until upload
    pub temp_dir: PathBuf,
}

/// Result of walking the remote tree
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub items: Vec<RemoteItem>,

    /// Folders whose listing failed and were skipped
    pub failed_dirs: Vec<String>,
}

/// Counts for one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub discovered: usize,
    pub enqueued: usize,
    pub already_queued: usize,
    pub already_processed: usize,
    pub awaiting_replay: usize,
    pub too_large: usize,
    pub deferred: usize,
    pub failed: usize,
    pub listing_errors: usize,
}

impl ScanResult {
    fn record(&mut self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Enqueued => self.enqueued += 1,
            IngestOutcome::AlreadyQueued => self.already_queued += 1,
            IngestOutcome::AlreadyProcessed => self.already_processed += 1,
            IngestOutcome::AwaitingReplay => self.awaiting_replay += 1,
            IngestOutcome::TooLarge { .. } => self.too_large += 1,
            IngestOutcome::Deferred => self.deferred += 1,
        }
    }

    /// Items that needed no work this scan
    pub fn skipped(&self) -> usize {
        self.already_queued + self.already_processed + self.awaiting_replay + self.too_large
    }
}

/// Counts for one error-store replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayResult {
    pub replayed: usize,
    pub still_failing: usize,

    /// Records whose local artifact was gone; dropped so a rescan redoes them
    pub missing_artifact: usize,

    /// Records for ids that were processed in the meantime
    pub already_processed: usize,
}

/// Sequential producer feeding the durable queue
pub struct IngestPipeline {
    source: Arc<dyn ItemSource>,
    materializer: Arc<dyn ArtifactMaterializer>,
    uploader: Arc<dyn ArtifactUploader>,
    queue: Arc<DurableQueue>,
    processed: Arc<ProcessedSet>,
    errors: Arc<ErrorStore>,
    settings: IngestSettings,
}

impl IngestPipeline {
    pub fn new(
        source: Arc<dyn ItemSource>,
        materializer: Arc<dyn ArtifactMaterializer>,
        uploader: Arc<dyn ArtifactUploader>,
        queue: Arc<DurableQueue>,
        processed: Arc<ProcessedSet>,
        errors: Arc<ErrorStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            source,
            materializer,
            uploader,
            queue,
            processed,
            errors,
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Walk the tree under `root` with an explicit work stack.
    ///
    /// A folder whose listing fails is logged and skipped; the rest of the
    /// tree is still enumerated.
    pub async fn enumerate(&self, root: &str) -> Enumeration {
        let mut enumeration = Enumeration::default();
        let mut pending = vec![root.to_string()];

        while let Some(dir) = pending.pop() {
            let children = match self.source.list_dir(&dir).await {
                Ok(children) => children,
                Err(e) => {
                    error!(path = %dir, error = %e, "Folder listing failed, skipping");
                    enumeration.failed_dirs.push(dir);
                    continue;
                }
            };

            for child in children {
                if child.is_dir() {
                    pending.push(child.path);
                } else if child.matches_mime(&self.settings.mime_prefix) {
                    enumeration.items.push(child);
                }
            }
        }

        enumeration
    }

    /// One full pass over the source tree
    #[instrument(skip(self), fields(root = %self.settings.root))]
    pub async fn scan(&self) -> ScanResult {
        let mut labels = LabelCounter::new();
        self.scan_with_labels(&mut labels).await
    }

    /// Scan using caller-owned label numbering
    pub async fn scan_with_labels(&self, labels: &mut LabelCounter) -> ScanResult {
        let enumeration = self.enumerate(&self.settings.root).await;

        let mut result = ScanResult {
            discovered: enumeration.items.len(),
            listing_errors: enumeration.failed_dirs.len(),
            ..Default::default()
        };
        info!(items = result.discovered, "Scan found items");

        for item in &enumeration.items {
            // Every discovered item takes an ordinal so labels stay stable across scans
            let label = labels.next_label(&item.path);

            match self.ingest_item(item, &label).await {
                Ok(outcome) => result.record(&outcome),
                Err(e) => {
                    error!(source_id = %item.path, error = %e, "Item ingestion failed");
                    result.failed += 1;
                }
            }
        }

        info!(
            discovered = result.discovered,
            enqueued = result.enqueued,
            skipped = result.skipped(),
            deferred = result.deferred,
            failed = result.failed,
            listing_errors = result.listing_errors,
            "Scan complete"
        );
        result
    }

    /// Turn one discovered item into a job, or explain why not
    #[instrument(skip(self, item), fields(source_id = %item.path))]
    pub async fn ingest_item(&self, item: &RemoteItem, label: &str) -> Result<IngestOutcome, IngestError> {
        let source_id = item.path.as_str();

        if self.processed.contains(source_id).await {
            debug!("Already processed");
            return Ok(IngestOutcome::AlreadyProcessed);
        }
        if self.queue.contains(source_id).await {
            debug!("Already queued");
            return Ok(IngestOutcome::AlreadyQueued);
        }
        if self.errors.contains(source_id).await {
            debug!("Waiting for error-store replay");
            return Ok(IngestOutcome::AwaitingReplay);
        }

        let size = item.size.unwrap_or(0);
        if size > self.settings.max_size_bytes {
            info!(size, max = self.settings.max_size_bytes, "Item too large, skipping");
            return Ok(IngestOutcome::TooLarge { size });
        }

        tokio::fs::create_dir_all(&self.settings.temp_dir)
            .await
            .map_err(|source| IngestError::TempDir {
                path: self.settings.temp_dir.clone(),
                source,
            })?;

        let (video_path, audio_path) = temp_paths(&self.settings.temp_dir, source_id);

        info!(size, "Downloading item");
        if let Err(e) = self.source.download(item, &video_path).await {
            remove_temp(&video_path).await;
            return Err(IngestError::Download {
                source_id: source_id.to_string(),
                message: format!("{:#}", e),
            });
        }

        let materialized = self.materializer.materialize(&video_path, &audio_path).await;
        remove_temp(&video_path).await;

        let artifact = match materialized {
            Ok(artifact) if artifact.duration_seconds > 0.0 => artifact,
            Ok(artifact) => {
                remove_temp(&artifact.path).await;
                return Err(IngestError::Materialize {
                    source_id: source_id.to_string(),
                    message: format!("audio has no duration ({})", artifact.duration_seconds),
                });
            }
            Err(e) => {
                remove_temp(&audio_path).await;
                return Err(IngestError::Materialize {
                    source_id: source_id.to_string(),
                    message: format!("{:#}", e),
                });
            }
        };

        let object_name = object_name(&artifact.path);
        match self.uploader.upload(&artifact.path, &object_name).await {
            Ok(uri) => {
                let job = Job::new(source_id, uri, artifact.duration_seconds, label);
                let enqueued = self.queue.enqueue(job).await;
                remove_temp(&artifact.path).await;

                Ok(if enqueued.is_new() {
                    IngestOutcome::Enqueued
                } else {
                    IngestOutcome::AlreadyQueued
                })
            }
            Err(e) => {
                warn!(error = %e, "Upload failed, keeping artifact for replay");
                self.errors
                    .record(ErrorRecord::new(
                        source_id,
                        artifact.path,
                        artifact.duration_seconds,
                        label,
                    ))
                    .await;
                Ok(IngestOutcome::Deferred)
            }
        }
    }

    /// Retry the upload stage for every error record
    #[instrument(skip(self))]
    pub async fn replay_errors(&self) -> ReplayResult {
        let mut result = ReplayResult::default();

        for record in self.errors.list().await {
            let source_id = record.source_id.clone();
            let artifact = record.artifact_local_ref.clone();

            if self.processed.contains(&source_id).await {
                self.errors.remove(&source_id).await;
                remove_temp(&artifact).await;
                result.already_processed += 1;
                continue;
            }

            if !tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
                warn!(
                    %source_id,
                    artifact = %artifact.display(),
                    "Replay artifact is gone, dropping record"
                );
                self.errors.remove(&source_id).await;
                result.missing_artifact += 1;
                continue;
            }

            let object_name = object_name(&artifact);
            match self.uploader.upload(&artifact, &object_name).await {
                Ok(uri) => {
                    self.queue.enqueue(record.into_job(uri)).await;
                    self.errors.remove(&source_id).await;
                    remove_temp(&artifact).await;
                    info!(%source_id, "Replayed upload");
                    result.replayed += 1;
                }
                Err(e) => {
                    warn!(%source_id, error = %e, "Replay upload failed, keeping record");
                    result.still_failing += 1;
                }
            }
        }

        if result != ReplayResult::default() {
            info!(
                replayed = result.replayed,
                still_failing = result.still_failing,
                missing_artifact = result.missing_artifact,
                "Error store replay complete"
            );
        }
        result
    }
}

/// Temp file paths for an item, unique per source id
pub fn temp_paths(temp_dir: &Path, source_id: &str) -> (PathBuf, PathBuf) {
    let digest = hex::encode(Sha256::digest(source_id.as_bytes()));
    let prefix = &digest[..TEMP_PREFIX_LEN];

    let base = source_id.rsplit('/').next().unwrap_or(source_id);
    let stem = Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());

    (
        temp_dir.join(format!("{}_{}", prefix, base)),
        temp_dir.join(format!("{}_{}.ogg", prefix, stem)),
    )
}

fn object_name(artifact: &Path) -> String {
    artifact
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| artifact.to_string_lossy().into_owned())
}

async fn remove_temp(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_paths_are_unique_per_source() {
        let dir = Path::new("/tmp/vidscribe");
        let (video_a, audio_a) = temp_paths(dir, "disk:/A/lesson.mp4");
        let (video_b, audio_b) = temp_paths(dir, "disk:/B/lesson.mp4");

        assert_ne!(video_a, video_b);
        assert_ne!(audio_a, audio_b);
        assert!(video_a.to_string_lossy().ends_with("_lesson.mp4"));
        assert!(audio_a.to_string_lossy().ends_with("_lesson.ogg"));
        assert_eq!(object_name(&audio_a).len(), TEMP_PREFIX_LEN + "_lesson.ogg".len());
    }

    #[test]
    fn test_scan_result_skipped() {
        let mut result = ScanResult::default();
        result.record(&IngestOutcome::AlreadyProcessed);
        result.record(&IngestOutcome::TooLarge { size: 1 });
        result.record(&IngestOutcome::Enqueued);

        assert_eq!(result.skipped(), 2);
        assert_eq!(result.enqueued, 1);
    }
}
