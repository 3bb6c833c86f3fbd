//! Durable pipeline state.
//!
//! Three stores share one pattern: an in-memory collection guarded by a
//! mutex, fully rewritten to a JSON snapshot inside the same critical section
//! on every mutation.
//!
//! - `DurableQueue`: pending jobs keyed by source id
//! - `ProcessedSet`: source ids that finished successfully
//! - `ErrorStore`: artifacts whose upload failed, awaiting replay
//!
//! Persistence write failures are logged and never roll back the in-memory
//! mutation; the in-memory state stays authoritative for the process lifetime.

pub mod errors;
pub mod processed;
pub mod queue;
pub mod snapshot;

use thiserror::Error;

pub use errors::ErrorStore;
pub use processed::ProcessedSet;
pub use queue::{DurableQueue, EnqueueResult, QueueStatus};
pub use snapshot::SnapshotFile;

/// Errors reading or writing a snapshot
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
