//! Whole-document JSON snapshots with atomic replacement.
//!
//! Every store keeps its full state in a single JSON file. A save writes the
//! new document to a temp file next to the target and renames it into place,
//! so a crash mid-write leaves the previous snapshot intact.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::warn;

use super::StoreError;

/// A typed JSON document on disk
#[derive(Debug)]
pub struct SnapshotFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SnapshotFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot; a missing file is an empty state
    pub async fn load(&self) -> Result<T, StoreError> {
        if !fs::try_exists(&self.path).await? {
            return Ok(T::default());
        }

        let content = fs::read(&self.path).await?;
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(T::default());
        }

        Ok(serde_json::from_slice(&content)?)
    }

    /// Read the snapshot, falling back to an empty state if it is unreadable
    pub async fn load_or_default(&self) -> T {
        match self.load().await {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable snapshot, starting from empty state"
                );
                T::default()
            }
        }
    }

    /// Atomically replace the snapshot with `value`
    pub async fn save(&self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(())
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
