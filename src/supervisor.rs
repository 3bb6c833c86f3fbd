//! Process lifecycle: startup recovery and the two long-lived loops.
//!
//! ```text
//! Supervisor::start
//!   ├─ lock state dir, reload queue / processed set / error store
//!   ├─ replay error store (upload stage only)
//!   ├─ spawn WorkerPool            (continuous drain)
//!   └─ spawn scan loop             (scan, sleep, replay, scan, ...)
//! ```
//!
//! Both loops are independent; neither waits on the other.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fs2::FileExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::adapters::{
    ArtifactMaterializer, ArtifactUploader, FfmpegMaterializer, ItemSource, ObjectStorageUploader,
    Recognizer, SpeechKitRecognizer, YandexDiskSource,
};
use crate::config::paths::StatePaths;
use crate::config::{ResolvedConfig, Secrets};
use crate::ingest::{IngestPipeline, IngestSettings, ReplayResult};
use crate::store::{DurableQueue, ErrorStore, ProcessedSet};
use crate::worker::{
    JobOutcome, JobReport, JsonlTranscriptLog, PoolHandle, PoolStats, TranscriptSink, WorkerPool,
    WorkerSettings,
};

/// Exclusive advisory lock on the state directory, released on drop
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock without blocking; fails if another process holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "Another vidscribe instance is using this state directory (lock: {})",
                path.display()
            )
        })?;

        debug!(lock = %path.display(), "Instance lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(lock = %self.path.display(), error = %e, "Failed to release instance lock");
        }
    }
}

/// The three durable stores, shared between the scan loop and the workers
#[derive(Clone)]
pub struct Stores {
    pub queue: Arc<DurableQueue>,
    pub processed: Arc<ProcessedSet>,
    pub errors: Arc<ErrorStore>,
}

impl Stores {
    /// Load every store from its last snapshot.
    ///
    /// Unreadable snapshots are logged and start empty.
    pub async fn open(paths: &StatePaths) -> Self {
        Self {
            queue: Arc::new(DurableQueue::open(&paths.queue).await),
            processed: Arc::new(ProcessedSet::open(&paths.processed).await),
            errors: Arc::new(ErrorStore::open(&paths.errors).await),
        }
    }
}

/// External services the pipeline runs against
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn ItemSource>,
    pub materializer: Arc<dyn ArtifactMaterializer>,
    pub uploader: Arc<dyn ArtifactUploader>,
    pub recognizer: Arc<dyn Recognizer>,
    pub sink: Arc<dyn TranscriptSink>,
}

impl Collaborators {
    /// Production adapters built from configuration and credentials
    pub fn from_config(config: &ResolvedConfig, secrets: &Secrets) -> Result<Self> {
        let paths = config.state_paths();

        let uploader = ObjectStorageUploader::new(
            &config.storage.endpoint,
            &config.storage.bucket,
            &config.storage.region,
            &secrets.storage_access_key,
            &secrets.storage_secret_key,
        )?;

        let recognizer = SpeechKitRecognizer::new(&secrets.speechkit_api_key, &config.recognition.language)
            .with_urls(&config.recognition.submit_url, &config.recognition.operation_url);

        Ok(Self {
            source: Arc::new(YandexDiskSource::new(&secrets.disk_token)),
            materializer: Arc::new(FfmpegMaterializer::new()),
            uploader: Arc::new(uploader),
            recognizer: Arc::new(recognizer),
            sink: Arc::new(JsonlTranscriptLog::new(paths.transcripts)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub scan_interval: Duration,
    pub ingest: IngestSettings,
    pub workers: WorkerSettings,
}

impl SupervisorSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            scan_interval: config.scan_interval,
            ingest: IngestSettings {
                root: config.source.root.clone(),
                max_size_bytes: config.source.max_size_bytes,
                mime_prefix: config.source.mime_prefix.clone(),
                temp_dir: config.state_paths().temp_dir,
            },
            workers: config.worker_settings(),
        }
    }
}

/// Owns the stores, the ingestion pipeline and the worker pool
pub struct Supervisor {
    stores: Stores,
    pipeline: Arc<IngestPipeline>,
    pool: WorkerPool,
    scan_interval: Duration,
    _lock: Option<InstanceLock>,
}

impl Supervisor {
    /// Lock the state directory and load persisted state
    pub async fn open(
        paths: &StatePaths,
        collaborators: Collaborators,
        settings: SupervisorSettings,
    ) -> Result<Self> {
        let lock = InstanceLock::acquire(&paths.lock)?;
        let stores = Stores::open(paths).await;

        let mut supervisor = Self::from_parts(stores, collaborators, settings);
        supervisor._lock = Some(lock);
        Ok(supervisor)
    }

    /// Production supervisor: configuration, env credentials, real adapters
    pub async fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let secrets = Secrets::from_env()?;
        let collaborators = Collaborators::from_config(config, &secrets)?;
        Self::open(
            &config.state_paths(),
            collaborators,
            SupervisorSettings::from_config(config),
        )
        .await
    }

    /// Assemble from already-loaded stores (no instance lock)
    pub fn from_parts(stores: Stores, collaborators: Collaborators, settings: SupervisorSettings) -> Self {
        let pipeline = IngestPipeline::new(
            collaborators.source,
            collaborators.materializer,
            collaborators.uploader.clone(),
            stores.queue.clone(),
            stores.processed.clone(),
            stores.errors.clone(),
            settings.ingest,
        );

        let pool = WorkerPool::new(
            stores.queue.clone(),
            stores.processed.clone(),
            collaborators.recognizer,
            collaborators.sink,
            settings.workers,
        );

        Self {
            stores,
            pipeline: Arc::new(pipeline),
            pool,
            scan_interval: settings.scan_interval,
            _lock: None,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }

    /// Replay the error store before any scanning
    pub async fn recover(&self) -> ReplayResult {
        let status = self.stores.queue.status().await;
        let errors = self.stores.errors.len().await;
        info!(
            queued = status.total(),
            error_records = errors,
            processed = self.stores.processed.len().await,
            "Recovered persisted state"
        );

        self.pipeline.replay_errors().await
    }

    /// Recover, then start the worker pool and the scan loop
    pub async fn start(self) -> SupervisorHandle {
        self.recover().await;

        let pool = self.pool.start();
        let scan_task = tokio::spawn(scan_loop(self.pipeline.clone(), self.scan_interval));

        SupervisorHandle {
            pool,
            scan_task,
            _lock: self._lock,
        }
    }

    /// Start and keep running until the process is terminated
    pub async fn run(self) -> Result<()> {
        let mut handle = self.start().await;

        while let Some(report) = handle.next_report().await {
            log_report(&report, handle.stats());
        }

        anyhow::bail!("Worker pool stopped unexpectedly")
    }
}

/// Handle to a started supervisor
pub struct SupervisorHandle {
    pool: PoolHandle,
    scan_task: JoinHandle<()>,
    _lock: Option<InstanceLock>,
}

impl SupervisorHandle {
    pub async fn next_report(&mut self) -> Option<JobReport> {
        self.pool.next_report().await
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Stop the scan loop and the workers
    pub async fn shutdown(self) -> PoolStats {
        self.scan_task.abort();
        self.pool.shutdown().await
    }
}

/// One scan per cycle; each cycle runs in its own task so a panic only costs that cycle
async fn scan_loop(pipeline: Arc<IngestPipeline>, interval: Duration) {
    let mut cycle: u64 = 0;

    loop {
        cycle += 1;

        let cycle_pipeline = pipeline.clone();
        let scanned = tokio::spawn(async move {
            // The first cycle follows the startup replay
            if cycle > 1 {
                cycle_pipeline.replay_errors().await;
            }
            cycle_pipeline.scan().await
        })
        .await;

        if let Err(e) = scanned {
            error!(cycle, error = %e, "Scan cycle aborted");
        }

        info!(cycle, next_in_secs = interval.as_secs(), "Waiting for next scan");
        sleep(interval).await;
    }
}

fn log_report(report: &JobReport, stats: PoolStats) {
    let elapsed_secs = report.elapsed.as_secs_f64();
    match &report.outcome {
        JobOutcome::Succeeded | JobOutcome::Skipped => debug!(
            worker = report.worker,
            source_id = %report.source_id,
            elapsed_secs,
            "Job report"
        ),
        outcome => warn!(
            worker = report.worker,
            source_id = %report.source_id,
            elapsed_secs,
            ?outcome,
            "Job did not succeed"
        ),
    }

    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        timed_out = stats.timed_out,
        faulted = stats.faulted,
        "Pool totals"
    );
}
