//! Bounded worker pool draining the durable queue.
//!
//! Each worker loops: claim a job, run its recognition state machine to a
//! terminal state, record the result, report it. An empty queue puts the
//! worker to sleep for the idle interval. Jobs run in their own task so a
//! panic is contained to that job and reported as a fault; the faulted job is
//! dropped from the queue so the next scan picks the item up again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::sink::TranscriptSink;
use crate::adapters::Recognizer;
use crate::domain::{Job, TranscriptEntry};
use crate::recognition::{RecognitionMachine, RecognitionMode, RecognitionRequest};
use crate::store::{DurableQueue, ProcessedSet};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Number of concurrent workers
    pub concurrency: usize,

    /// Sleep when the queue is empty
    pub idle_interval: Duration,

    /// Wait after a rate-limited poll
    pub rate_limit_cooldown: Duration,

    pub mode: RecognitionMode,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            idle_interval: Duration::from_secs(10),
            rate_limit_cooldown: Duration::from_secs(3600),
            mode: RecognitionMode::Interactive,
        }
    }
}

/// Terminal result of one job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded,

    /// Already in the processed set when claimed
    Skipped,

    Failed { reason: String },

    TimedOut,

    /// The job's task panicked; the job was dropped from the queue
    Faulted { reason: String },
}

/// Completion report sent by a worker after each job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub worker: usize,
    pub source_id: String,
    pub outcome: JobOutcome,
    pub elapsed: Duration,
}

/// Aggregated job outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub faulted: usize,
}

impl PoolStats {
    pub fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => self.succeeded += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
            JobOutcome::TimedOut => self.timed_out += 1,
            JobOutcome::Faulted { .. } => self.faulted += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed + self.timed_out + self.faulted
    }
}

/// Shared state every worker runs against
#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<DurableQueue>,
    processed: Arc<ProcessedSet>,
    recognizer: Arc<dyn Recognizer>,
    sink: Arc<dyn TranscriptSink>,
    settings: WorkerSettings,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<DurableQueue>,
        processed: Arc<ProcessedSet>,
        recognizer: Arc<dyn Recognizer>,
        sink: Arc<dyn TranscriptSink>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            processed,
            recognizer,
            sink,
            settings,
        }
    }

    /// Spawn the workers and return a handle to their reports
    pub fn start(self) -> PoolHandle {
        let concurrency = if self.settings.concurrency == 0 {
            warn!("Worker concurrency of 0 requested, using 1");
            1
        } else {
            self.settings.concurrency
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for id in 0..concurrency {
            workers.spawn(worker_loop(id, self.clone(), stop_rx.clone(), report_tx.clone()));
        }

        info!(
            workers = concurrency,
            mode = %self.settings.mode,
            recognizer = self.recognizer.name(),
            "Worker pool started"
        );

        PoolHandle {
            stop_tx,
            workers,
            reports: report_rx,
            stats: PoolStats::default(),
        }
    }

    /// Run one claimed job to a terminal state and record the result
    #[instrument(skip(self, job), fields(source_id = %job.source_id))]
    pub async fn process_job(&self, job: Job) -> JobOutcome {
        if self.processed.contains(&job.source_id).await {
            debug!("Already processed, dropping job");
            self.queue.remove(&job.source_id).await;
            return JobOutcome::Skipped;
        }

        let request = RecognitionRequest {
            artifact_uri: job.artifact_uri.clone(),
            duration_secs: job.artifact_duration_seconds,
            mode: self.settings.mode,
        };
        let result = RecognitionMachine::new(
            self.recognizer.as_ref(),
            request,
            self.settings.rate_limit_cooldown,
        )
        .run()
        .await;

        let text = match result {
            Ok(text) => text,
            Err(e) => {
                self.queue.remove(&job.source_id).await;
                warn!(error = %e, "Job abandoned");
                return if e.is_timeout() {
                    JobOutcome::TimedOut
                } else {
                    JobOutcome::Failed {
                        reason: e.to_string(),
                    }
                };
            }
        };

        let chars = text.chars().count();
        let entry = TranscriptEntry::for_job(&job, text);
        if let Err(e) = self.sink.append(&entry).await {
            error!(error = %e, "Failed to store transcript");
            self.queue.remove(&job.source_id).await;
            return JobOutcome::Failed {
                reason: format!("transcript sink: {:#}", e),
            };
        }

        // Marked processed before removal: a crash in between leaves a job
        // that is skipped on the next claim
        self.processed.mark_processed(&job.source_id).await;
        self.queue.remove(&job.source_id).await;

        info!(chars, label = %job.transcript_label, "Job succeeded");
        JobOutcome::Succeeded
    }
}

/// Handle to a running pool
pub struct PoolHandle {
    stop_tx: watch::Sender<bool>,
    workers: JoinSet<()>,
    reports: mpsc::UnboundedReceiver<JobReport>,
    stats: PoolStats,
}

impl PoolHandle {
    /// Wait for the next job report
    pub async fn next_report(&mut self) -> Option<JobReport> {
        let report = self.reports.recv().await?;
        self.stats.record(&report.outcome);
        Some(report)
    }

    /// Outcomes of all reports received so far
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Stop all workers and collect the remaining reports.
    ///
    /// Workers stop at their next suspension point; a job interrupted this
    /// way stays in the queue snapshot and is retried after a restart.
    pub async fn shutdown(mut self) -> PoolStats {
        let _ = self.stop_tx.send(true);

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        while let Ok(report) = self.reports.try_recv() {
            self.stats.record(&report.outcome);
        }

        info!(
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            timed_out = self.stats.timed_out,
            faulted = self.stats.faulted,
            "Worker pool stopped"
        );
        self.stats
    }
}

async fn worker_loop(
    id: usize,
    pool: WorkerPool,
    mut stop: watch::Receiver<bool>,
    reports: mpsc::UnboundedSender<JobReport>,
) {
    debug!(worker = id, "Worker started");

    loop {
        if *stop.borrow() {
            break;
        }

        let job = match pool.queue.drain_one().await {
            Some(job) => job,
            None => {
                tokio::select! {
                    _ = sleep(pool.settings.idle_interval) => continue,
                    _ = stop.changed() => break,
                }
            }
        };

        let source_id = job.source_id.clone();
        let started = Instant::now();
        info!(worker = id, %source_id, "Job claimed");

        let task_pool = pool.clone();
        let mut task = tokio::spawn(async move { task_pool.process_job(job).await });

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = stop.changed() => {
                task.abort();
                warn!(worker = id, %source_id, "Job interrupted by shutdown");
                break;
            }
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(worker = id, %source_id, error = %e, "Job faulted, releasing it for the next scan");
                // Unclaimed and gone from the snapshot, the item is ingested afresh by the next scan
                pool.queue.remove(&source_id).await;
                JobOutcome::Faulted {
                    reason: e.to_string(),
                }
            }
        };

        let elapsed = started.elapsed();
        debug!(worker = id, %source_id, elapsed_secs = elapsed.as_secs_f64(), ?outcome, "Job finished");

        let _ = reports.send(JobReport {
            worker: id,
            source_id,
            outcome,
            elapsed,
        });
    }

    debug!(worker = id, "Worker stopped");
}
