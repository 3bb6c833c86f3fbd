//! Transcripts produced by finished recognition jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Job;

/// A finished transcript, one line of the transcript log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub source_id: String,
    pub transcript_label: String,
    pub text: String,
    pub completed_at: DateTime<Utc>,
}

impl TranscriptEntry {
    /// Tag recognized text with the job it came from
    pub fn for_job(job: &Job, text: String) -> Self {
        Self {
            source_id: job.source_id.clone(),
            transcript_label: job.transcript_label.clone(),
            text,
            completed_at: Utc::now(),
        }
    }
}
