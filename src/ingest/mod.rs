//! Ingestion pipeline.
//!
//! Turns items discovered on the remote store into durable jobs:
//!
//! ```text
//! ItemSource ─list─▶ enumerate ─▶ ingest_item ─download─▶ materialize ─upload─┬─▶ DurableQueue
//!                                     │                                      └─▶ ErrorStore (upload failed)
//!                                     └─ skipped: processed / queued / awaiting replay / too large
//! ```
//!
//! `replay_errors` retries only the upload stage for records in the error
//! store, since the extracted audio is kept on local disk.

pub mod labels;
pub mod pipeline;

pub use labels::{folder_name, LabelCounter};
pub use pipeline::{
    Enumeration, IngestError, IngestOutcome, IngestPipeline, IngestSettings, ReplayResult, ScanResult,
};
