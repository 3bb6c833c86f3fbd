//! In-memory fakes of the collaborator traits shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use vidscribe::adapters::{
    ArtifactMaterializer, ArtifactUploader, ItemSource, LocalArtifact, Recognizer, RemoteItem,
};
use vidscribe::config::paths::StatePaths;
use vidscribe::domain::{Job, TranscriptEntry};
use vidscribe::ingest::{IngestPipeline, IngestSettings};
use vidscribe::recognition::{Operation, PollOutcome, RecognitionChunk, RecognitionMode};
use vidscribe::supervisor::{Collaborators, Stores};
use vidscribe::worker::TranscriptSink;

pub const STORAGE_BASE: &str = "https://storage.test/bucket";

pub fn job(source_id: &str) -> Job {
    Job::new(source_id, format!("{}/{}.ogg", STORAGE_BASE, source_id.replace('/', "_")), 60.0, "test #1")
}

/// Remote tree keyed by folder path
#[derive(Default)]
pub struct FakeSource {
    tree: HashMap<String, Vec<RemoteItem>>,
    failing_dirs: HashSet<String>,
    pub lists: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, path: &str, children: Vec<RemoteItem>) -> Self {
        self.tree.insert(path.to_string(), children);
        self
    }

    pub fn with_failing_dir(mut self, path: &str) -> Self {
        self.failing_dirs.insert(path.to_string());
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemSource for FakeSource {
    fn name(&self) -> &str {
        "fake-source"
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteItem>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.failing_dirs.contains(path) {
            anyhow::bail!("HTTP 503 listing {}", path);
        }
        Ok(self.tree.get(path).cloned().unwrap_or_default())
    }

    async fn download(&self, item: &RemoteItem, dest: &Path) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let body = format!("video bytes of {}", item.path);
        tokio::fs::write(dest, &body).await?;
        Ok(body.len() as u64)
    }
}

/// Writes a small audio file and reports a fixed duration
pub struct FakeMaterializer {
    pub duration_seconds: f64,
    pub calls: AtomicUsize,
}

impl FakeMaterializer {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ArtifactMaterializer for FakeMaterializer {
    async fn materialize(&self, video: &Path, audio_dest: &Path) -> Result<LocalArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(video.exists(), "video {} missing", video.display());
        tokio::fs::write(audio_dest, b"OggS").await?;
        Ok(LocalArtifact {
            path: audio_dest.to_path_buf(),
            duration_seconds: self.duration_seconds,
        })
    }
}

/// Records uploads; can be switched into a failing state
#[derive(Default)]
pub struct FakeUploader {
    pub failing: AtomicBool,
    pub uploads: Mutex<Vec<String>>,
}

impl FakeUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let uploader = Self::default();
        uploader.set_failing(true);
        uploader
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactUploader for FakeUploader {
    async fn upload(&self, local: &Path, object_name: &str) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("storage unavailable");
        }
        anyhow::ensure!(local.exists(), "artifact {} missing", local.display());
        self.uploads.lock().unwrap().push(object_name.to_string());
        Ok(format!("{}/{}", STORAGE_BASE, object_name))
    }
}

/// Recognizer whose poll replies are scripted per artifact URI.
///
/// URIs without a script finish on the first poll with
/// `"transcript of <uri>"`.
#[derive(Default)]
pub struct ScriptedRecognizer {
    scripts: Mutex<HashMap<String, VecDeque<Result<PollOutcome>>>>,
    panic_on: Mutex<HashSet<String>>,
    fail_submit: Mutex<HashSet<String>>,
    pub submits: AtomicUsize,
    pub polls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, uri: &str, replies: Vec<Result<PollOutcome>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(uri.to_string(), replies.into());
    }

    /// Submitting this URI panics
    pub fn panic_on(&self, uri: &str) {
        self.panic_on.lock().unwrap().insert(uri.to_string());
    }

    pub fn fail_submit(&self, uri: &str) {
        self.fail_submit.lock().unwrap().insert(uri.to_string());
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

pub fn done(texts: &[&str]) -> Result<PollOutcome> {
    Ok(PollOutcome::Operation(Operation::completed(
        texts.iter().map(|t| RecognitionChunk::with_text(*t)).collect(),
    )))
}

pub fn running() -> Result<PollOutcome> {
    Ok(PollOutcome::Operation(Operation::running()))
}

pub fn rate_limited() -> Result<PollOutcome> {
    Ok(PollOutcome::RateLimited)
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn submit(&self, artifact_uri: &str, _duration_secs: f64, _mode: RecognitionMode) -> Result<String> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if self.panic_on.lock().unwrap().contains(artifact_uri) {
            panic!("recognizer crashed on {}", artifact_uri);
        }
        if self.fail_submit.lock().unwrap().contains(artifact_uri) {
            anyhow::bail!("HTTP 400 for {}", artifact_uri);
        }
        Ok(format!("op:{}", artifact_uri))
    }

    async fn poll(&self, operation_id: &str) -> Result<PollOutcome> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let uri = operation_id.trim_start_matches("op:");

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(uri)
            .and_then(|replies| replies.pop_front());

        match scripted {
            Some(reply) => reply,
            None => done(&["transcript of", uri]),
        }
    }
}

/// Collects transcripts in memory
#[derive(Default)]
pub struct MemorySink {
    pub entries: Mutex<Vec<TranscriptEntry>>,
}

impl MemorySink {
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptSink for MemorySink {
    async fn append(&self, entry: &TranscriptEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

/// Temp state directory plus the stores opened on it
pub struct TestState {
    pub temp: TempDir,
    pub paths: StatePaths,
    pub stores: Stores,
}

impl TestState {
    pub async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let paths = StatePaths::new(temp.path());
        let stores = Stores::open(&paths).await;
        Self { temp, paths, stores }
    }

    /// Reopen every store from disk, as after a restart
    pub async fn restart(&self) -> Stores {
        Stores::open(&self.paths).await
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            root: "disk:/".to_string(),
            max_size_bytes: 1024 * 1024,
            mime_prefix: "video/".to_string(),
            temp_dir: self.paths.temp_dir.clone(),
        }
    }

    pub fn pipeline(
        &self,
        source: Arc<FakeSource>,
        materializer: Arc<FakeMaterializer>,
        uploader: Arc<FakeUploader>,
    ) -> IngestPipeline {
        IngestPipeline::new(
            source,
            materializer,
            uploader,
            self.stores.queue.clone(),
            self.stores.processed.clone(),
            self.stores.errors.clone(),
            self.ingest_settings(),
        )
    }
}

pub fn collaborators(
    source: Arc<FakeSource>,
    uploader: Arc<FakeUploader>,
    recognizer: Arc<ScriptedRecognizer>,
    sink: Arc<MemorySink>,
) -> Collaborators {
    Collaborators {
        source,
        materializer: Arc::new(FakeMaterializer::new(60.0)),
        uploader,
        recognizer,
        sink,
    }
}
