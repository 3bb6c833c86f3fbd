//! Domain types for the transcription pipeline.
//!
//! This module contains the core data structures:
//! - Job: A pending artifact awaiting transcription
//! - ErrorRecord: An extracted artifact whose upload failed
//! - TranscriptEntry: Recognized text tagged with its source

pub mod job;
pub mod transcript;

pub use job::{ErrorRecord, Job};
pub use transcript::TranscriptEntry;
