//! vidscribe - durable video transcription pipeline
//!
//! Finds videos on a remote disk, extracts a compact audio track, uploads it
//! to object storage and transcribes it with a long-running speech
//! recognition service. Every step is tracked in durable stores so restarts,
//! rate limits and transient failures neither lose nor duplicate work.
//!
//! # Architecture
//!
//! ```text
//! Supervisor ─▶ IngestPipeline ─▶ DurableQueue ─▶ WorkerPool ─▶ RecognitionMachine ─▶ transcripts.jsonl
//!                     │                                 │
//!                     └─▶ ErrorStore (upload failed)    └─▶ ProcessedSet (success)
//! ```
//!
//! # Modules
//!
//! - `domain`: Jobs, error records, transcript entries
//! - `store`: Durable queue, processed set, error store
//! - `recognition`: Polling schedules and the per-job state machine
//! - `adapters`: Collaborator traits and their Yandex Cloud / ffmpeg implementations
//! - `ingest`: Enumeration, per-item ingestion, error replay
//! - `worker`: Worker pool and transcript sink
//! - `supervisor`: Startup recovery and the long-lived loops
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon
//! vidscribe run
//!
//! # One scan without workers
//! vidscribe scan
//!
//! # Re-transcribe an item
//! vidscribe purge "disk:/Courses/intro.mp4"
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod recognition;
pub mod store;
pub mod supervisor;
pub mod worker;

// Re-export main types at crate root for convenience
pub use domain::{ErrorRecord, Job, TranscriptEntry};
pub use ingest::{IngestPipeline, ScanResult};
pub use recognition::{RecognitionError, RecognitionMachine, RecognitionMode};
pub use store::{DurableQueue, ErrorStore, ProcessedSet};
pub use supervisor::Supervisor;
pub use worker::{WorkerPool, WorkerSettings};
