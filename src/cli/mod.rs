//! Command-line interface for vidscribe.
//!
//! `run` starts the daemon; the other commands inspect or adjust the
//! persisted state.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{self, paths::StatePaths, ResolvedConfig};
use crate::supervisor::{InstanceLock, Stores, Supervisor};

/// vidscribe - durable video transcription pipeline
#[derive(Parser, Debug)]
#[command(name = "vidscribe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the supervisor: worker pool plus periodic scans (runs forever)
    Run,

    /// Replay the error store and run one scan, without workers
    Scan,

    /// Show queue, error store and processed-set counts
    Status,

    /// Forget a processed source id so the next scan picks it up again
    Purge {
        /// Source id (remote path), e.g. "disk:/Courses/intro.mp4"
        source_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Run => run(cfg).await,
            Commands::Scan => scan(cfg).await,
            Commands::Status => show_status(cfg).await,
            Commands::Purge { source_id } => purge(cfg, &source_id).await,
            Commands::Config => show_config(cfg),
        }
    }
}

async fn run(cfg: &ResolvedConfig) -> Result<()> {
    let supervisor = Supervisor::from_config(cfg).await?;
    supervisor.run().await
}

async fn scan(cfg: &ResolvedConfig) -> Result<()> {
    let supervisor = Supervisor::from_config(cfg).await?;
    let replay = supervisor.recover().await;
    let result = supervisor.pipeline().scan().await;

    println!();
    println!("Scan of {}", cfg.source.root);
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("Error store replay:");
    println!("  Replayed:         {}", replay.replayed);
    println!("  Still failing:    {}", replay.still_failing);
    println!("  Missing artifact: {}", replay.missing_artifact);
    println!();
    println!("Items:");
    println!("  Discovered:       {}", result.discovered);
    println!("  Enqueued:         {}", result.enqueued);
    println!("  Already queued:   {}", result.already_queued);
    println!("  Already done:     {}", result.already_processed);
    println!("  Awaiting replay:  {}", result.awaiting_replay);
    println!("  Too large:        {}", result.too_large);
    println!("  Upload deferred:  {}", result.deferred);
    println!("  Failed:           {}", result.failed);
    if result.listing_errors > 0 {
        println!();
        println!("⚠️  {} folder listing(s) failed", result.listing_errors);
    }

    Ok(())
}

async fn show_status(cfg: &ResolvedConfig) -> Result<()> {
    let paths = cfg.state_paths();
    let stores = Stores::open(&paths).await;
    let queue = stores.queue.status().await;

    println!();
    println!("vidscribe Status");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!("State dir:   {}", paths.home.display());
    println!();
    println!("Queue:");
    println!("  Pending:    {}", queue.total());
    println!("Error store:  {}", stores.errors.len().await);
    println!("Processed:    {}", stores.processed.len().await);

    let errors = stores.errors.list().await;
    if !errors.is_empty() {
        println!();
        println!("Awaiting upload replay:");
        for record in &errors {
            println!(
                "  {} ({}, failed {})",
                record.source_id,
                record.artifact_local_ref.display(),
                record.failed_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    let jobs = stores.queue.jobs().await;
    if !jobs.is_empty() {
        println!();
        println!("Queued:");
        for job in jobs.iter().take(20) {
            println!(
                "  [{}] {} ({:.0}s)",
                job.transcript_label, job.source_id, job.artifact_duration_seconds
            );
        }
        if jobs.len() > 20 {
            println!("  ... and {} more", jobs.len() - 20);
        }
    }

    Ok(())
}

async fn purge(cfg: &ResolvedConfig, source_id: &str) -> Result<()> {
    let paths: StatePaths = cfg.state_paths();
    // A running daemon would overwrite the purge with its in-memory set
    let _lock = InstanceLock::acquire(&paths.lock)?;
    let stores = Stores::open(&paths).await;

    if stores.processed.purge(source_id).await {
        println!("✓ Purged {}; it will be picked up by the next scan", source_id);
    } else {
        println!("{} is not in the processed set", source_id);
    }

    Ok(())
}

fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let paths = cfg.state_paths();

    println!();
    println!("vidscribe Configuration");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:         {}", paths.home.display());
    println!("  Queue:        {}", paths.queue.display());
    println!("  Processed:    {}", paths.processed.display());
    println!("  Errors:       {}", paths.errors.display());
    println!("  Transcripts:  {}", paths.transcripts.display());
    println!("  Temp:         {}", paths.temp_dir.display());
    println!();
    println!("Source:");
    println!("  Root:         {}", cfg.source.root);
    println!("  MIME prefix:  {}", cfg.source.mime_prefix);
    println!("  Max size:     {} bytes", cfg.source.max_size_bytes);
    println!("  Scan every:   {}s", cfg.scan_interval.as_secs());
    println!();
    println!("Recognition:");
    println!("  Mode:         {} (model {})", cfg.recognition.mode, cfg.recognition.mode.model());
    println!("  Language:     {}", cfg.recognition.language);
    println!("  Cooldown:     {}s", cfg.recognition.rate_limit_cooldown.as_secs());
    println!("  Workers:      {}", cfg.concurrency);
    println!("  Idle wait:    {}s", cfg.idle_interval.as_secs());
    println!();
    println!("Storage:");
    println!("  Endpoint:     {}", cfg.storage.endpoint);
    println!("  Bucket:       {}", cfg.storage.bucket);
    println!("  Region:       {}", cfg.storage.region);
    println!();
    println!("Credentials:");
    for key in [
        config::ENV_DISK_TOKEN,
        config::ENV_SPEECHKIT_KEY,
        config::ENV_STORAGE_ACCESS_KEY,
        config::ENV_STORAGE_SECRET_KEY,
    ] {
        let mark = if std::env::var(key).map_or(false, |v| !v.trim().is_empty()) {
            "✓"
        } else {
            "✗"
        };
        println!("  {} {}", mark, key);
    }

    Ok(())
}
