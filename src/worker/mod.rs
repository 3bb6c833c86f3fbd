//! Worker pool and transcript sink.

pub mod pool;
pub mod sink;

pub use pool::{JobOutcome, JobReport, PoolHandle, PoolStats, WorkerPool, WorkerSettings};
pub use sink::{JsonlTranscriptLog, TranscriptSink};
