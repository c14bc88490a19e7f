//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use synmine_core::{HttpConfig, RetryPolicy};
use synmine_text::MinerConfig;
use synmine_text::config::{DEFAULT_BATCH_SIZE, DEFAULT_CONTEXT_SIZE, DEFAULT_MAX_FILE_SIZE};

/// Global configuration for synmine
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub miner: MinerSection,
    pub workers: WorkersConfig,
    pub remote: RemoteConfig,
    pub http: HttpSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MinerSection {
    pub context_size: usize,
    pub deduplicate: bool,
    pub batch_size: usize,
    pub allowed_extensions: Vec<String>,
    pub max_file_size: u64,
}

impl Default for MinerSection {
    fn default() -> Self {
        let defaults = MinerConfig::default();
        Self {
            context_size: DEFAULT_CONTEXT_SIZE,
            deduplicate: true,
            batch_size: DEFAULT_BATCH_SIZE,
            allowed_extensions: defaults.allowed_extensions.into_iter().collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            default: synmine_text::config::default_workers(),
            max: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub output: PathBuf,
    pub tracking_file: PathBuf,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let defaults = synmine_pmc::Config::default();
        Self {
            base_url: defaults.base_url,
            output: defaults.output,
            tracking_file: defaults.tracking_file,
            retry_attempts: defaults.retry.max_attempts,
            retry_delay_secs: defaults.retry.delay.as_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_secs(self.retry_delay_secs),
        )
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Seconds without data before a download counts as stalled
    pub read_timeout: u64,
    /// Seconds allowed for whole-body requests (listings)
    pub request_timeout: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        let defaults = HttpConfig::default();
        Self {
            read_timeout: defaults.read_timeout.as_secs(),
            request_timeout: defaults.request_timeout.as_secs(),
        }
    }
}

/// Global CLI flags that override file values
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub context_size: Option<usize>,
    pub no_dedup: bool,
    pub workers: Option<usize>,
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./synmine.toml (current directory)
    /// 2. ~/.config/synmine/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("synmine.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "synmine") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve the miner settings, CLI flags first. Not yet validated.
    pub fn miner(&self, overrides: &Overrides) -> MinerConfig {
        let workers = overrides
            .workers
            .unwrap_or(self.workers.default)
            .min(self.workers.max);
        MinerConfig {
            context_size: overrides.context_size.unwrap_or(self.miner.context_size),
            deduplicate: self.miner.deduplicate && !overrides.no_dedup,
            workers,
            batch_size: self.miner.batch_size,
            max_file_size: self.miner.max_file_size,
            ..MinerConfig::default()
        }
        .with_extensions(&self.miner.allowed_extensions)
    }

    pub fn http(&self, read_timeout: Option<u64>) -> HttpConfig {
        HttpConfig {
            read_timeout: Duration::from_secs(read_timeout.unwrap_or(self.http.read_timeout)),
            request_timeout: Duration::from_secs(self.http.request_timeout),
        }
    }
}
