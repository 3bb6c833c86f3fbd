//! Speech recognition lifecycle: mode schedules, operation payloads, and the
//! per-job state machine that polls a [`Recognizer`](crate::adapters::Recognizer).

pub mod machine;
pub mod operation;
pub mod schedule;

pub use machine::{PollStats, RecognitionMachine, RecognitionRequest, RecognitionState};
pub use operation::{assemble_transcript, Operation, PollOutcome, RecognitionChunk};
pub use schedule::{PollSchedule, RecognitionMode};

use thiserror::Error;

/// Terminal recognition failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecognitionError {
    #[error("Recognition submit failed: {0}")]
    Submit(String),

    #[error("Operation {operation_id} failed with code {code}: {message}")]
    Operation {
        operation_id: String,
        code: i64,
        message: String,
    },

    #[error("Operation {0} finished without results")]
    NoResults(String),

    #[error("Operation {operation_id} timed out after {waited_secs:.0}s")]
    TimedOut {
        operation_id: String,
        waited_secs: f64,
    },
}

impl RecognitionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}
