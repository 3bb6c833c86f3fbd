//! Canonical state paths for vidscribe.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! ## Layout
//!
//! | File | Owner | Purpose |
//! |------|-------|---------|
//! | `processed_files.json` | `ProcessedSet` | source ids that finished |
//! | `queue.json` | `DurableQueue` | pending jobs snapshot |
//! | `errors.json` | `ErrorStore` | artifacts awaiting upload replay |
//! | `transcripts.jsonl` | `JsonlTranscriptLog` | finished transcripts |
//! | `temp/` | `IngestPipeline` | downloads and extracted audio |
//! | `vidscribe.lock` | `Supervisor` | single-instance lock |

use std::path::{Path, PathBuf};

pub const PROCESSED_FILE: &str = "processed_files.json";
pub const QUEUE_FILE: &str = "queue.json";
pub const ERRORS_FILE: &str = "errors.json";
pub const TRANSCRIPTS_FILE: &str = "transcripts.jsonl";
pub const TEMP_DIR: &str = "temp";
pub const LOCK_FILE: &str = "vidscribe.lock";

/// Every persisted location under one state directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub home: PathBuf,
    pub processed: PathBuf,
    pub queue: PathBuf,
    pub errors: PathBuf,
    pub transcripts: PathBuf,
    pub temp_dir: PathBuf,
    pub lock: PathBuf,
}

impl StatePaths {
    pub fn new(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref();
        Self {
            home: home.to_path_buf(),
            processed: home.join(PROCESSED_FILE),
            queue: home.join(QUEUE_FILE),
            errors: home.join(ERRORS_FILE),
            transcripts: home.join(TRANSCRIPTS_FILE),
            temp_dir: home.join(TEMP_DIR),
            lock: home.join(LOCK_FILE),
        }
    }
}
