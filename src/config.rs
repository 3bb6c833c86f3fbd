//! Configuration for vidscribe.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (VIDSCRIBE_HOME, VIDSCRIBE_SOURCE_ROOT, VIDSCRIBE_MODE, VIDSCRIBE_WORKERS)
//! 2. Config file (.vidscribe/config.yaml)
//! 3. Defaults (~/.vidscribe, Yandex Cloud endpoints)
//!
//! Config file discovery:
//! - Searches current directory and parents for .vidscribe/config.yaml
//! - `paths.home` in the config file is relative to the .vidscribe/ directory
//!
//! Credentials are never read from the config file, only from the
//! environment (see [`Secrets`]).

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::speechkit::{DEFAULT_OPERATION_URL, DEFAULT_SUBMIT_URL};
use crate::recognition::RecognitionMode;
use crate::worker::WorkerSettings;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DEFAULT_SOURCE_ROOT: &str = "disk:/";
const DEFAULT_MAX_SIZE_BYTES: u64 = 20 * 1024 * 1024 * 1024;
const DEFAULT_MIME_PREFIX: &str = "video/";
const DEFAULT_LANGUAGE: &str = "ru-RU";
const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 3600;
const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_IDLE_INTERVAL_SECS: u64 = 10;
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.yandexcloud.net";
const DEFAULT_STORAGE_BUCKET: &str = "video-to-text";
const DEFAULT_STORAGE_REGION: &str = "ru-central1";

pub const ENV_DISK_TOKEN: &str = "YANDEX_DISK_OAUTH_TOKEN";
pub const ENV_SPEECHKIT_KEY: &str = "YANDEX_SPEECHKIT_API_KEY";
pub const ENV_STORAGE_ACCESS_KEY: &str = "YOBJECT_STORAGE_ACCESS_KEY";
pub const ENV_STORAGE_SECRET_KEY: &str = "YOBJECT_STORAGE_SECRET_KEY";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .vidscribe/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    pub root: Option<String>,
    pub max_size_bytes: Option<u64>,
    pub mime_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecognitionConfig {
    pub mode: Option<RecognitionMode>,
    pub language: Option<String>,
    pub submit_url: Option<String>,
    pub operation_url: Option<String>,
    pub rate_limit_cooldown_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkersConfig {
    pub concurrency: Option<usize>,
    pub idle_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    pub scan_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

/// Resolved configuration with absolute paths and defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the state directory
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub source: SourceSettings,
    pub recognition: RecognitionSettings,
    pub concurrency: usize,
    pub idle_interval: Duration,
    pub scan_interval: Duration,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub root: String,
    pub max_size_bytes: u64,
    pub mime_prefix: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionSettings {
    pub mode: RecognitionMode,
    pub language: String,
    pub submit_url: String,
    pub operation_url: String,
    pub rate_limit_cooldown: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
}

impl ResolvedConfig {
    /// Worker pool settings derived from this configuration
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.concurrency,
            idle_interval: self.idle_interval,
            rate_limit_cooldown: self.recognition.rate_limit_cooldown,
            mode: self.recognition.mode,
        }
    }

    pub fn state_paths(&self) -> paths::StatePaths {
        paths::StatePaths::new(&self.home)
    }
}

/// Credentials for the external services
#[derive(Clone)]
pub struct Secrets {
    pub disk_token: String,
    pub speechkit_api_key: String,
    pub storage_access_key: String,
    pub storage_secret_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    /// Read all credentials from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`; every missing name is reported
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut missing = Vec::new();
        let mut get = |key: &'static str| match lookup(key).filter(|v| !v.trim().is_empty()) {
            Some(value) => value,
            None => {
                missing.push(key);
                String::new()
            }
        };

        let secrets = Self {
            disk_token: get(ENV_DISK_TOKEN),
            speechkit_api_key: get(ENV_SPEECHKIT_KEY),
            storage_access_key: get(ENV_STORAGE_ACCESS_KEY),
            storage_secret_key: get(ENV_STORAGE_SECRET_KEY),
        };

        if !missing.is_empty() {
            anyhow::bail!("Missing required environment variables: {}", missing.join(", "));
        }
        Ok(secrets)
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".vidscribe").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge env lookups, an optional parsed config file, and defaults
pub fn resolve_config(
    file: Option<(&Path, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path.to_path_buf()), config),
        None => (None, ConfigFile::default()),
    };

    let home = if let Some(env_home) = env("VIDSCRIBE_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(home_path), Some(config_path)) = (&config.paths.home, &config_file) {
        let vidscribe_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(vidscribe_dir, home_path)
    } else {
        dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(".vidscribe")
    };

    let mode = match env("VIDSCRIBE_MODE") {
        Some(raw) => raw
            .parse::<RecognitionMode>()
            .map_err(|e| anyhow::anyhow!("VIDSCRIBE_MODE: {}", e))?,
        None => config.recognition.mode.unwrap_or_default(),
    };

    let concurrency = match env("VIDSCRIBE_WORKERS") {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("VIDSCRIBE_WORKERS must be a number, got '{}'", raw))?,
        None => config.workers.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
    };

    let source = SourceSettings {
        root: env("VIDSCRIBE_SOURCE_ROOT")
            .or(config.source.root)
            .unwrap_or_else(|| DEFAULT_SOURCE_ROOT.to_string()),
        max_size_bytes: config.source.max_size_bytes.unwrap_or(DEFAULT_MAX_SIZE_BYTES),
        mime_prefix: config
            .source
            .mime_prefix
            .unwrap_or_else(|| DEFAULT_MIME_PREFIX.to_string()),
    };

    let recognition = RecognitionSettings {
        mode,
        language: config
            .recognition
            .language
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        submit_url: config
            .recognition
            .submit_url
            .unwrap_or_else(|| DEFAULT_SUBMIT_URL.to_string()),
        operation_url: config
            .recognition
            .operation_url
            .unwrap_or_else(|| DEFAULT_OPERATION_URL.to_string()),
        rate_limit_cooldown: Duration::from_secs(
            config
                .recognition
                .rate_limit_cooldown_secs
                .unwrap_or(DEFAULT_RATE_LIMIT_COOLDOWN_SECS),
        ),
    };

    let storage = StorageSettings {
        endpoint: config
            .storage
            .endpoint
            .unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.to_string()),
        bucket: config
            .storage
            .bucket
            .unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
        region: config
            .storage
            .region
            .unwrap_or_else(|| DEFAULT_STORAGE_REGION.to_string()),
    };

    Ok(ResolvedConfig {
        home,
        config_file,
        source,
        recognition,
        concurrency,
        idle_interval: Duration::from_secs(
            config
                .workers
                .idle_interval_secs
                .unwrap_or(DEFAULT_IDLE_INTERVAL_SECS),
        ),
        scan_interval: Duration::from_secs(
            config
                .schedule
                .scan_interval_secs
                .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS),
        ),
        storage,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let config_path = find_config_file();

    let file = match config_path {
        Some(ref path) => Some((path.as_path(), load_config_file(path)?)),
        None => None,
    };

    resolve_config(file, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = resolve_config(None, no_env).unwrap();

        let expected_home = dirs::home_dir().unwrap().join(".vidscribe");
        assert_eq!(config.home, expected_home);
        assert_eq!(config.source.root, "disk:/");
        assert_eq!(config.source.max_size_bytes, 20 * 1024 * 1024 * 1024);
        assert_eq!(config.recognition.mode, RecognitionMode::Interactive);
        assert_eq!(config.recognition.language, "ru-RU");
        assert_eq!(config.recognition.rate_limit_cooldown, Duration::from_secs(3600));
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.scan_interval, Duration::from_secs(43_200));
        assert_eq!(config.storage.bucket, "video-to-text");
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".vidscribe");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: state
source:
  root: "disk:/Courses"
  max_size_bytes: 1000
recognition:
  mode: deferred
  language: en-US
workers:
  concurrency: 30
schedule:
  scan_interval_secs: 600
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.recognition.mode, Some(RecognitionMode::Deferred));

        let config = resolve_config(Some((&config_path, parsed)), no_env).unwrap();
        assert_eq!(config.home, dir.join("state"));
        assert_eq!(config.source.root, "disk:/Courses");
        assert_eq!(config.source.max_size_bytes, 1000);
        assert_eq!(config.source.mime_prefix, "video/");
        assert_eq!(config.recognition.mode, RecognitionMode::Deferred);
        assert_eq!(config.recognition.language, "en-US");
        assert_eq!(config.concurrency, 30);
        assert_eq!(config.scan_interval, Duration::from_secs(600));
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            recognition: RecognitionConfig {
                mode: Some(RecognitionMode::Deferred),
                ..Default::default()
            },
            workers: WorkersConfig {
                concurrency: Some(5),
                ..Default::default()
            },
            ..Default::default()
        };
        let env: HashMap<&str, &str> = [
            ("VIDSCRIBE_HOME", "/srv/vidscribe"),
            ("VIDSCRIBE_MODE", "interactive"),
            ("VIDSCRIBE_WORKERS", "12"),
            ("VIDSCRIBE_SOURCE_ROOT", "disk:/Inbox"),
        ]
        .into_iter()
        .collect();

        let config = resolve_config(Some((Path::new("/etc/.vidscribe/config.yaml"), file)), |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/srv/vidscribe"));
        assert_eq!(config.recognition.mode, RecognitionMode::Interactive);
        assert_eq!(config.concurrency, 12);
        assert_eq!(config.source.root, "disk:/Inbox");

        let settings = config.worker_settings();
        assert_eq!(settings.concurrency, 12);
        assert_eq!(settings.mode, RecognitionMode::Interactive);
    }

    #[test]
    fn test_invalid_env_values_are_errors() {
        assert!(resolve_config(None, |k| (k == "VIDSCRIBE_WORKERS").then(|| "many".to_string())).is_err());
        assert!(resolve_config(None, |k| (k == "VIDSCRIBE_MODE").then(|| "batch".to_string())).is_err());
    }

    #[test]
    fn test_secrets_report_all_missing() {
        let err = Secrets::from_lookup(|key| (key == ENV_DISK_TOKEN).then(|| "t".to_string())).unwrap_err();
        let message = err.to_string();

        assert!(!message.contains(ENV_DISK_TOKEN));
        assert!(message.contains(ENV_SPEECHKIT_KEY));
        assert!(message.contains(ENV_STORAGE_SECRET_KEY));
    }

    #[test]
    fn test_secrets_debug_hides_values() {
        let secrets = Secrets::from_lookup(|_| Some("hunter2".to_string())).unwrap();
        assert!(!format!("{:?}", secrets).contains("hunter2"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
