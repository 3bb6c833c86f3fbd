//! Durable job queue keyed by source id.
//!
//! Jobs stay in the persisted snapshot from `enqueue` until `remove`, even
//! while a worker holds them. A worker claims a job with `drain_one`, which
//! only marks it in memory; a crash before `remove` leaves the job in the
//! snapshot and `reload` hands it out again on the next start.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::snapshot::SnapshotFile;
use crate::domain::Job;

#[derive(Debug, Default)]
struct QueueState {
    /// All live jobs in enqueue order (the persisted snapshot)
    jobs: VecDeque<Job>,

    /// Source ids currently held by a worker
    claimed: HashSet<String>,
}

impl QueueState {
    fn contains(&self, source_id: &str) -> bool {
        self.jobs.iter().any(|job| job.source_id == source_id)
    }
}

/// Persisted queue of pending jobs
#[derive(Debug)]
pub struct DurableQueue {
    file: SnapshotFile<Vec<Job>>,
    state: Mutex<QueueState>,
}

impl DurableQueue {
    /// Create an empty queue backed by `path` (nothing is read yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: SnapshotFile::new(path),
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Create a queue and load its last snapshot
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let queue = Self::new(path);
        queue.reload().await;
        queue
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Replace the in-memory queue with the last persisted snapshot.
    ///
    /// Every job in the snapshot becomes claimable again. Returns the number
    /// of jobs loaded.
    pub async fn reload(&self) -> usize {
        let snapshot = self.file.load_or_default().await;

        let mut seen = HashSet::new();
        let mut jobs = VecDeque::with_capacity(snapshot.len());
        for job in snapshot {
            if seen.insert(job.source_id.clone()) {
                jobs.push_back(job);
            } else {
                warn!(source_id = %job.source_id, "Dropping duplicate job from queue snapshot");
            }
        }

        let mut state = self.state.lock().await;
        state.jobs = jobs;
        state.claimed.clear();

        info!(jobs = state.jobs.len(), path = %self.path().display(), "Queue reloaded");
        state.jobs.len()
    }

    /// Add a job unless one for the same source id is already live
    pub async fn enqueue(&self, job: Job) -> EnqueueResult {
        let mut state = self.state.lock().await;

        if state.contains(&job.source_id) {
            debug!(source_id = %job.source_id, "Job already queued");
            return EnqueueResult::AlreadyQueued;
        }

        info!(source_id = %job.source_id, label = %job.transcript_label, "Job enqueued");
        state.jobs.push_back(job);
        self.persist(&state).await;

        EnqueueResult::Queued
    }

    /// Claim the oldest unclaimed job, if any
    pub async fn drain_one(&self) -> Option<Job> {
        let mut state = self.state.lock().await;

        let job = state
            .jobs
            .iter()
            .find(|job| !state.claimed.contains(&job.source_id))
            .cloned()?;

        state.claimed.insert(job.source_id.clone());
        Some(job)
    }

    /// Drop a job from memory and from the snapshot (idempotent)
    pub async fn remove(&self, source_id: &str) -> bool {
        let mut state = self.state.lock().await;

        state.claimed.remove(source_id);
        let before = state.jobs.len();
        state.jobs.retain(|job| job.source_id != source_id);

        if state.jobs.len() == before {
            return false;
        }

        self.persist(&state).await;
        true
    }

    /// Whether a live job exists for `source_id`
    pub async fn contains(&self, source_id: &str) -> bool {
        self.state.lock().await.contains(source_id)
    }

    /// Copy of all live jobs in queue order
    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.iter().cloned().collect()
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            pending: state.jobs.len() - state.claimed.len(),
            in_flight: state.claimed.len(),
        }
    }

    /// Write the full snapshot; called with the state lock held
    async fn persist(&self, state: &QueueState) {
        let snapshot: Vec<Job> = state.jobs.iter().cloned().collect();
        if let Err(e) = self.file.save(&snapshot).await {
            warn!(
                path = %self.path().display(),
                error = %e,
                "Failed to persist queue snapshot, keeping in-memory state"
            );
        }
    }
}

/// Result of enqueueing a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Added as a new job
    Queued,

    /// A job for this source id is already live
    AlreadyQueued,
}

impl EnqueueResult {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Queue depth summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub pending: usize,
    pub in_flight: usize,
}

impl QueueStatus {
    pub fn total(&self) -> usize {
        self.pending + self.in_flight
    }
}
