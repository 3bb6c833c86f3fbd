//! Jobs and error records tracked by the durable stores.
//!
//! A `Job` is the unit of pipeline work: an uploaded audio artifact waiting
//! for transcription. An `ErrorRecord` is an artifact that was extracted but
//! could not be uploaded, kept on local disk until a replay succeeds.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending unit of transcription work, keyed by `source_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Path of the originating item on the remote store
    pub source_id: String,

    /// Publicly dereferenceable URI of the uploaded audio artifact
    pub artifact_uri: String,

    /// Duration of the audio artifact in seconds (drives polling timing)
    pub artifact_duration_seconds: f64,

    /// Human-readable grouping name derived from the source folder
    pub transcript_label: String,

    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job stamped with the current time
    pub fn new(
        source_id: impl Into<String>,
        artifact_uri: impl Into<String>,
        artifact_duration_seconds: f64,
        transcript_label: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            artifact_uri: artifact_uri.into(),
            artifact_duration_seconds,
            transcript_label: transcript_label.into(),
            created_at: Utc::now(),
        }
    }
}

/// An artifact whose upload failed; replayed through the upload stage later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub source_id: String,

    /// Local audio file retained for the replay
    pub artifact_local_ref: PathBuf,

    pub artifact_duration_seconds: f64,

    /// Label assigned during the scan that produced the artifact
    #[serde(default)]
    pub transcript_label: String,

    pub failed_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(
        source_id: impl Into<String>,
        artifact_local_ref: impl Into<PathBuf>,
        artifact_duration_seconds: f64,
        transcript_label: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            artifact_local_ref: artifact_local_ref.into(),
            artifact_duration_seconds,
            transcript_label: transcript_label.into(),
            failed_at: Utc::now(),
        }
    }

    /// Turn a successfully re-uploaded record into a job
    pub fn into_job(self, artifact_uri: impl Into<String>) -> Job {
        Job::new(
            self.source_id,
            artifact_uri,
            self.artifact_duration_seconds,
            self.transcript_label,
        )
    }
}
