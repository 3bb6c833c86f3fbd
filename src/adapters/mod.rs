//! Adapter interfaces for external systems.
//!
//! The pipeline only talks to the outside world through these traits:
//! a remote file tree to enumerate and download from, a local transcoder,
//! an object store for the audio artifacts, and a long-running speech
//! recognizer. Concrete adapters live in the submodules.

pub mod ffmpeg;
pub mod object_storage;
pub mod speechkit;
pub mod yandex_disk;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::recognition::{PollOutcome, RecognitionMode};

pub use ffmpeg::FfmpegMaterializer;
pub use object_storage::ObjectStorageUploader;
pub use speechkit::SpeechKitRecognizer;
pub use yandex_disk::YandexDiskSource;

/// Kind of entry in the remote tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Dir,
    File,
}

/// One entry returned by a directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Full remote path, also used as the job's source id
    pub path: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ItemKind,

    #[serde(default)]
    pub mime_type: Option<String>,

    /// Size in bytes (files only)
    #[serde(default)]
    pub size: Option<u64>,
}

impl RemoteItem {
    pub fn dir(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path).to_string(),
            path,
            kind: ItemKind::Dir,
            mime_type: None,
            size: None,
        }
    }

    pub fn file(path: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        let path = path.into();
        Self {
            name: base_name(&path).to_string(),
            path,
            kind: ItemKind::File,
            mime_type: Some(mime_type.into()),
            size: Some(size),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ItemKind::Dir
    }

    /// File whose MIME type starts with `prefix`
    pub fn matches_mime(&self, prefix: &str) -> bool {
        self.kind == ItemKind::File
            && self
                .mime_type
                .as_deref()
                .map_or(false, |mime| mime.starts_with(prefix))
    }
}

fn base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Audio extracted from a downloaded item
#[derive(Debug, Clone, PartialEq)]
pub struct LocalArtifact {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// Remote hierarchical file tree
#[async_trait]
pub trait ItemSource: Send + Sync {
    fn name(&self) -> &str;

    /// Every direct child of `path`, across all result pages
    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteItem>>;

    /// Stream the item's content into `dest`, returning the bytes written
    async fn download(&self, item: &RemoteItem, dest: &Path) -> Result<u64>;
}

/// Turns a downloaded video into a compact audio artifact
#[async_trait]
pub trait ArtifactMaterializer: Send + Sync {
    async fn materialize(&self, video: &Path, audio_dest: &Path) -> Result<LocalArtifact>;
}

/// Publishes a local artifact and returns its public URI
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, local: &Path, object_name: &str) -> Result<String>;
}

/// Long-running speech recognition service
#[async_trait]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Start recognition and return the operation id
    async fn submit(&self, artifact_uri: &str, duration_secs: f64, mode: RecognitionMode) -> Result<String>;

    /// Query the operation once
    async fn poll(&self, operation_id: &str) -> Result<PollOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing_item() {
        let json = r#"{
            "path": "disk:/Courses/Rust/lesson 1.mp4",
            "name": "lesson 1.mp4",
            "type": "file",
            "mime_type": "video/mp4",
            "size": 1048576,
            "md5": "abc"
        }"#;

        let item: RemoteItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.kind, ItemKind::File);
        assert!(item.matches_mime("video/"));
        assert!(!item.matches_mime("audio/"));
        assert_eq!(item.size, Some(1_048_576));
    }

    #[test]
    fn test_dir_never_matches_mime() {
        let dir = RemoteItem::dir("disk:/Courses/");
        assert!(dir.is_dir());
        assert_eq!(dir.name, "Courses");
        assert!(!dir.matches_mime(""));
    }
}
