//! Miner configuration

use std::collections::BTreeSet;
use std::fmt;

/// Default characters of context captured on each side of a match
pub const DEFAULT_CONTEXT_SIZE: usize = 100;

/// Default articles matched per parallel chunk
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default per-file size limit for local processing (500 MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Default worker count: `min(cpus, 8)`
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

/// Extraction and matching settings shared by local and remote runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerConfig {
    /// Characters captured before and after each identifier
    pub context_size: usize,
    /// Keep only the first occurrence of each identifier per document
    pub deduplicate: bool,
    /// Worker threads
    pub workers: usize,
    /// Lowercase extensions with leading dot (`.pdf`, `.gz`, ...)
    pub allowed_extensions: BTreeSet<String>,
    /// Articles per parallel matching chunk
    pub batch_size: usize,
    /// Local files larger than this are rejected
    pub max_file_size: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            context_size: DEFAULT_CONTEXT_SIZE,
            deduplicate: true,
            workers: default_workers(),
            allowed_extensions: [".pdf", ".txt", ".xml", ".html", ".gz"]
                .into_iter()
                .map(String::from)
                .collect(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl MinerConfig {
    /// Check the invariants every run relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context_size == 0 {
            return Err(ConfigError::ZeroContextSize);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        Ok(())
    }

    /// Validate and return self
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Normalize user-supplied extensions (`PDF`, `.txt`) to `.pdf`, `.txt`
    pub fn with_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_extensions = exts
            .into_iter()
            .map(|e| {
                let e = e.as_ref().trim().to_ascii_lowercase();
                if e.starts_with('.') { e } else { format!(".{e}") }
            })
            .filter(|e| e.len() > 1)
            .collect();
        self
    }

    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions.contains(ext)
    }
}

/// Invalid miner configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroContextSize,
    ZeroWorkers,
    ZeroBatchSize,
    NoExtensions,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroContextSize => write!(f, "context_size must be at least 1"),
            Self::ZeroWorkers => write!(f, "workers must be at least 1"),
            Self::ZeroBatchSize => write!(f, "batch_size must be at least 1"),
            Self::NoExtensions => write!(f, "allowed_extensions must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = MinerConfig::default();
        assert_eq!(config.context_size, 100);
        assert!(config.deduplicate);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_file_size, 500 * 1024 * 1024);
        assert!(config.workers >= 1 && config.workers <= 8);
        assert!(config.allows_extension(".gz"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_values() {
        let config = MinerConfig {
            context_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroContextSize));

        let config = MinerConfig {
            workers: 0,
            ..Default::default()
        };
        assert_eq!(config.validated(), Err(ConfigError::ZeroWorkers));

        let config = MinerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));
    }

    #[test]
    fn extensions_are_normalized() {
        let config = MinerConfig::default().with_extensions(["PDF", ".Txt", " xml ", ""]);
        let exts: Vec<_> = config.allowed_extensions.iter().cloned().collect();
        assert_eq!(exts, vec![".pdf", ".txt", ".xml"]);
    }

    #[test]
    fn empty_extension_set_is_invalid() {
        let config = MinerConfig::default().with_extensions(Vec::<String>::new());
        assert_eq!(config.validate(), Err(ConfigError::NoExtensions));
    }
}
