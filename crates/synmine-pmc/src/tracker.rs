//! Resumption state across runs
//!
//! A small JSON file remembers the leading PMC id of the last bundle whose
//! results are durable. It is loaded before a run, threaded through the
//! runner as a value, and saved by the caller.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::{leading_pmc_id, pmc_number};

/// Default tracking file name
pub const DEFAULT_TRACKING_FILE: &str = "last_processed_pmc.json";

const DESCRIPTION: &str = "Leading PMC id of the last bundle whose results were written";

/// Persisted resumption cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingState {
    #[serde(default)]
    pub last_processed_pmc_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_description")]
    pub description: String,
}

fn default_description() -> String {
    DESCRIPTION.to_string()
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            last_processed_pmc_id: None,
            updated_at: None,
            description: default_description(),
        }
    }
}

impl TrackingState {
    /// Move the cursor forward to `pmc_id`. Never moves backwards.
    pub fn advanced_to(self, pmc_id: &str) -> Self {
        let current = self.last_processed_pmc_id.as_deref().and_then(pmc_number);
        match (current, pmc_number(pmc_id)) {
            (Some(cur), Some(new)) if new <= cur => {
                log::debug!("Tracker stays at PMC{cur} (offered {pmc_id})");
                self
            }
            (_, None) => {
                log::warn!("Ignoring malformed PMC id for tracker: {pmc_id}");
                self
            }
            _ => self.overridden_to(pmc_id),
        }
    }

    /// Set the cursor unconditionally (manual override).
    pub fn overridden_to(self, pmc_id: &str) -> Self {
        Self {
            last_processed_pmc_id: Some(pmc_id.to_string()),
            updated_at: Some(Utc::now()),
            ..self
        }
    }
}

/// Leading PMC id of a bundle name: `PMC1_PMC10.xml.gz` → `PMC1`
pub fn extract_start_id(name: &str) -> Option<String> {
    leading_pmc_id(name).map(str::to_string)
}

/// Tracking file errors
#[derive(Debug)]
pub enum TrackingError {
    Io(io::Error),
    /// File exists but is not a valid tracking document
    Corrupt(serde_json::Error),
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "tracking file IO error: {e}"),
            Self::Corrupt(e) => write!(f, "tracking file corrupt: {e}"),
        }
    }
}

impl std::error::Error for TrackingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Corrupt(e) => Some(e),
        }
    }
}

impl From<io::Error> for TrackingError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Read the tracking file. A missing file is an empty state.
pub fn try_load(path: &Path) -> Result<TrackingState, TrackingError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TrackingState::default()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content).map_err(TrackingError::Corrupt)
}

/// Read the tracking file, degrading to an empty state on any error.
pub fn load(path: &Path) -> TrackingState {
    match try_load(path) {
        Ok(state) => state,
        Err(e) => {
            log::warn!("{}: {e}; starting without a resume point", path.display());
            TrackingState::default()
        }
    }
}

/// Write the tracking file atomically (tmp in the same directory, then rename).
pub fn save(path: &Path, state: &TrackingState) -> Result<(), TrackingError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    let json = serde_json::to_vec_pretty(state).map_err(io::Error::from)?;
    tmp.write_all(&json)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TrackingError::Io(e.error))?;

    if let Some(id) = &state.last_processed_pmc_id {
        log::info!("Updated tracking file with PMC id: {id}");
    }
    Ok(())
}
