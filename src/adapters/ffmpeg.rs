//! ffmpeg/ffprobe materializer.
//!
//! Strips the video stream and encodes mono Opus at 64 kbit/s, which is what
//! the recognizer accepts as `OGG_OPUS`.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ArtifactMaterializer, LocalArtifact};

/// Shells out to `ffmpeg` and `ffprobe`
pub struct FfmpegMaterializer {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for FfmpegMaterializer {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegMaterializer {
    /// Use the binaries on `PATH`, or `FFMPEG_PATH` / `FFPROBE_PATH` when set
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
        }
    }

    pub fn with_binaries(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    async fn extract_audio(&self, video: &Path, audio_dest: &Path) -> Result<()> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(video)
            .args(["-vn", "-c:a", "libopus", "-b:a", "64k", "-ac", "1"])
            .arg(audio_dest)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "ffmpeg failed with exit code {}: {}",
                exit_code,
                last_lines(&stderr, 5)
            );
        }

        Ok(())
    }

    /// Duration of a media file in seconds
    pub async fn probe_duration(&self, media: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(media)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run ffprobe")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed: {}", stderr.trim());
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl ArtifactMaterializer for FfmpegMaterializer {
    async fn materialize(&self, video: &Path, audio_dest: &Path) -> Result<LocalArtifact> {
        self.extract_audio(video, audio_dest).await?;
        let duration_seconds = self.probe_duration(audio_dest).await?;

        debug!(
            audio = %audio_dest.display(),
            duration_seconds,
            "Audio extracted"
        );

        Ok(LocalArtifact {
            path: audio_dest.to_path_buf(),
            duration_seconds,
        })
    }
}

/// Parse ffprobe's bare `format=duration` output
pub fn parse_duration(stdout: &str) -> Result<f64> {
    let raw = stdout.trim();
    let duration: f64 = raw
        .parse()
        .with_context(|| format!("Unexpected ffprobe duration output: '{}'", raw))?;

    if !duration.is_finite() || duration < 0.0 {
        anyhow::bail!("Invalid media duration: {}", duration);
    }

    Ok(duration)
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
