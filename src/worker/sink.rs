//! Where finished transcripts go.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::domain::TranscriptEntry;

/// Receives each successful transcript
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn append(&self, entry: &TranscriptEntry) -> Result<()>;
}

/// Append-only JSONL transcript log, one entry per line
#[derive(Debug)]
pub struct JsonlTranscriptLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTranscriptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back in append order
    pub async fn read_all(&self) -> Result<Vec<TranscriptEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open transcript log: {}", self.path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut entries = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let entry: TranscriptEntry = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse transcript entry: {}", line))?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

#[async_trait]
impl TranscriptSink for JsonlTranscriptLog {
    async fn append(&self, entry: &TranscriptEntry) -> Result<()> {
        let json = serde_json::to_string(entry).context("Failed to serialize transcript")?;

        // Concurrent workers must not interleave partial lines
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open transcript log: {}", self.path.display()))?;

        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write transcript")?;
        file.flush().await.context("Failed to flush transcript")?;

        Ok(())
    }
}
