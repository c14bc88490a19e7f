//! Remote pipeline configuration

use std::path::PathBuf;

use synmine_core::RetryPolicy;
use synmine_text::MinerConfig;

use crate::tracker::DEFAULT_TRACKING_FILE;

/// Europe PMC open-access bundle directory
pub const DEFAULT_BASE_URL: &str = "https://europepmc.org/ftp/oa/";

/// Default main output file
pub const DEFAULT_OUTPUT: &str = "results.csv";

/// Runtime configuration for a remote run
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory listing URL
    pub base_url: String,
    /// Main CSV; batch files are written next to it
    pub output: PathBuf,
    /// Bundle name (or `PMC{a}_PMC{b}` range) to start from
    pub start_from: Option<String>,
    /// Maximum bundles to attempt
    pub max_files: Option<usize>,
    /// Extraction and matching settings
    pub miner: MinerConfig,
    pub retry: RetryPolicy,
    /// Stop claiming bundles after the first failure
    pub fail_fast: bool,
    /// Resumption state file
    pub tracking_file: PathBuf,
    /// Where downloads land (a per-run temp dir when `None`)
    pub download_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            start_from: None,
            max_files: None,
            miner: MinerConfig::default(),
            retry: RetryPolicy::default(),
            fail_fast: false,
            tracking_file: PathBuf::from(DEFAULT_TRACKING_FILE),
            download_dir: None,
        }
    }
}
