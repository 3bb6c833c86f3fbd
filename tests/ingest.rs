//! Ingestion Pipeline Integration Tests
//!
//! Idempotent scans, upload-failure recovery through the error store, and
//! partial enumeration when a folder listing fails.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{FakeMaterializer, FakeSource, FakeUploader, TestState};
use tokio_test::assert_ok;
use vidscribe::adapters::RemoteItem;
use vidscribe::domain::ErrorRecord;
use vidscribe::ingest::pipeline::temp_paths;
use vidscribe::ingest::{IngestOutcome, ReplayResult};

const MIB: u64 = 1024 * 1024;

fn video(path: &str) -> RemoteItem {
    RemoteItem::file(path, "video/mp4", 1000)
}

fn course_tree() -> FakeSource {
    FakeSource::new()
        .with_dir(
            "disk:/",
            vec![
                RemoteItem::dir("disk:/Rust"),
                video("disk:/intro.mp4"),
                RemoteItem::file("disk:/notes.pdf", "application/pdf", 10),
            ],
        )
        .with_dir(
            "disk:/Rust",
            vec![
                video("disk:/Rust/1.mp4"),
                video("disk:/Rust/2.mp4"),
                RemoteItem::file("disk:/Rust/huge.mp4", "video/mp4", 2 * MIB),
            ],
        )
}

#[tokio::test]
async fn test_scan_enqueues_videos_with_folder_labels() {
    let state = TestState::new().await;
    let source = Arc::new(course_tree());
    let uploader = Arc::new(FakeUploader::new());
    let pipeline = state.pipeline(source.clone(), Arc::new(FakeMaterializer::new(42.0)), uploader.clone());

    let result = pipeline.scan().await;

    assert_eq!(result.discovered, 4);
    assert_eq!(result.enqueued, 3);
    assert_eq!(result.too_large, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(uploader.upload_count(), 3);

    let mut jobs = state.stores.queue.jobs().await;
    jobs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    let labels: Vec<(&str, &str)> = jobs
        .iter()
        .map(|j| (j.source_id.as_str(), j.transcript_label.as_str()))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("disk:/Rust/1.mp4", "Rust #1"),
            ("disk:/Rust/2.mp4", "Rust #2"),
            ("disk:/intro.mp4", "root #1"),
        ]
    );
    assert!(jobs.iter().all(|j| j.artifact_duration_seconds == 42.0));
    assert!(jobs.iter().all(|j| j.artifact_uri.starts_with(common::STORAGE_BASE)));

    // Temp files are gone once the job is queued
    let mut leftovers = assert_ok!(tokio::fs::read_dir(&state.paths.temp_dir).await);
    assert!(assert_ok!(leftovers.next_entry().await).is_none());
}

#[tokio::test]
async fn test_rescan_does_no_work_for_known_items() {
    let state = TestState::new().await;
    let source = Arc::new(course_tree());
    let uploader = Arc::new(FakeUploader::new());
    let pipeline = state.pipeline(source.clone(), Arc::new(FakeMaterializer::new(42.0)), uploader.clone());

    pipeline.scan().await;
    state.stores.processed.mark_processed("disk:/intro.mp4").await;
    state.stores.queue.remove("disk:/intro.mp4").await;

    let downloads = source.download_count();
    let before = state.stores.queue.jobs().await;

    let result = pipeline.scan().await;

    assert_eq!(result.enqueued, 0);
    assert_eq!(result.already_processed, 1);
    assert_eq!(result.already_queued, 2);
    assert_eq!(source.download_count(), downloads);
    assert_eq!(uploader.upload_count(), 3);
    assert_eq!(state.stores.queue.jobs().await.len(), before.len());
}

#[tokio::test]
async fn test_processed_item_is_never_downloaded() {
    let state = TestState::new().await;
    state.stores.processed.mark_processed("disk:/intro.mp4").await;

    let source = Arc::new(FakeSource::new().with_dir("disk:/", vec![video("disk:/intro.mp4")]));
    let materializer = Arc::new(FakeMaterializer::new(10.0));
    let uploader = Arc::new(FakeUploader::new());
    let pipeline = state.pipeline(source.clone(), materializer.clone(), uploader.clone());

    let outcome = assert_ok!(pipeline.ingest_item(&video("disk:/intro.mp4"), "root #1").await);

    assert_eq!(outcome, IngestOutcome::AlreadyProcessed);
    assert_eq!(source.download_count(), 0);
    assert_eq!(materializer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(uploader.upload_count(), 0);
    assert_eq!(state.stores.queue.status().await.total(), 0);
}

#[tokio::test]
async fn test_upload_failure_is_replayed_from_error_store() {
    let state = TestState::new().await;
    let source = Arc::new(FakeSource::new().with_dir("disk:/", vec![video("disk:/intro.mp4")]));
    let uploader = Arc::new(FakeUploader::failing());
    let pipeline = state.pipeline(source.clone(), Arc::new(FakeMaterializer::new(30.0)), uploader.clone());

    let result = pipeline.scan().await;
    assert_eq!(result.deferred, 1);
    assert_eq!(state.stores.queue.status().await.total(), 0);

    let records = state.stores.errors.list().await;
    assert_eq!(records.len(), 1);
    let artifact = records[0].artifact_local_ref.clone();
    assert_eq!(artifact, temp_paths(&state.paths.temp_dir, "disk:/intro.mp4").1);
    assert!(artifact.exists(), "artifact must be kept for replay");

    // The pending record blocks a fresh download
    let rescan = pipeline.scan().await;
    assert_eq!(rescan.awaiting_replay, 1);
    assert_eq!(source.download_count(), 1);

    // Still failing: the record stays
    let replay = pipeline.replay_errors().await;
    assert_eq!(replay.still_failing, 1);
    assert!(state.stores.errors.contains("disk:/intro.mp4").await);

    uploader.set_failing(false);
    let replay = pipeline.replay_errors().await;
    assert_eq!(
        replay,
        ReplayResult {
            replayed: 1,
            ..Default::default()
        }
    );

    let jobs = state.stores.queue.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].transcript_label, "root #1");
    assert_eq!(jobs[0].artifact_duration_seconds, 30.0);
    assert!(state.stores.errors.is_empty().await);
    assert!(!artifact.exists());
    assert_eq!(source.download_count(), 1);
}

#[tokio::test]
async fn test_replay_drops_record_with_missing_artifact() {
    let state = TestState::new().await;
    let gone = state.paths.temp_dir.join("gone.ogg");
    state
        .stores
        .errors
        .record(ErrorRecord::new("disk:/gone.mp4", &gone, 5.0, "root #1"))
        .await;

    let uploader = Arc::new(FakeUploader::new());
    let pipeline = state.pipeline(Arc::new(FakeSource::new()), Arc::new(FakeMaterializer::new(5.0)), uploader.clone());

    let replay = pipeline.replay_errors().await;

    assert_eq!(replay.missing_artifact, 1);
    assert!(state.stores.errors.is_empty().await);
    assert_eq!(uploader.upload_count(), 0);
    assert_eq!(state.stores.queue.status().await.total(), 0);
}

#[tokio::test]
async fn test_replay_skips_record_already_processed() {
    let state = TestState::new().await;
    tokio::fs::create_dir_all(&state.paths.temp_dir).await.unwrap();
    let kept = state.paths.temp_dir.join("kept.ogg");
    tokio::fs::write(&kept, b"OggS").await.unwrap();

    state
        .stores
        .errors
        .record(ErrorRecord::new("disk:/kept.mp4", &kept, 5.0, "root #1"))
        .await;
    state.stores.processed.mark_processed("disk:/kept.mp4").await;

    let uploader = Arc::new(FakeUploader::new());
    let pipeline = state.pipeline(Arc::new(FakeSource::new()), Arc::new(FakeMaterializer::new(5.0)), uploader.clone());

    let replay = pipeline.replay_errors().await;

    assert_eq!(replay.already_processed, 1);
    assert_eq!(uploader.upload_count(), 0);
    assert!(!kept.exists());
}

#[tokio::test]
async fn test_failing_folder_does_not_abort_scan() {
    let state = TestState::new().await;
    let source = Arc::new(
        FakeSource::new()
            .with_dir(
                "disk:/",
                vec![
                    RemoteItem::dir("disk:/Broken"),
                    RemoteItem::dir("disk:/Good"),
                    video("disk:/top.mp4"),
                ],
            )
            .with_dir("disk:/Good", vec![video("disk:/Good/a.mp4")])
            .with_failing_dir("disk:/Broken"),
    );
    let pipeline = state.pipeline(source, Arc::new(FakeMaterializer::new(10.0)), Arc::new(FakeUploader::new()));

    let result = pipeline.scan().await;

    assert_eq!(result.listing_errors, 1);
    assert_eq!(result.enqueued, 2);
    assert!(state.stores.queue.contains("disk:/Good/a.mp4").await);
    assert!(state.stores.queue.contains("disk:/top.mp4").await);
}

#[tokio::test]
async fn test_zero_duration_audio_is_not_enqueued() {
    let state = TestState::new().await;
    let source = Arc::new(FakeSource::new().with_dir("disk:/", vec![video("disk:/silent.mp4")]));
    let uploader = Arc::new(FakeUploader::new());
    let pipeline = state.pipeline(source, Arc::new(FakeMaterializer::new(0.0)), uploader.clone());

    let result = pipeline.scan().await;

    assert_eq!(result.failed, 1);
    assert_eq!(uploader.upload_count(), 0);
    assert_eq!(state.stores.queue.status().await.total(), 0);
    assert!(state.stores.errors.is_empty().await);
}
