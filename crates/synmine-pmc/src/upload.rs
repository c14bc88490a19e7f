//! Result publishing collaborators
//!
//! The workflow hands produced batch files and new rows to an [`Uploader`].
//! [`DirUploader`] is the filesystem-backed implementation.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use synmine_core::{FindingRow, read_rows};

/// Name of the deduplicated row table inside the destination root
pub const TABLE_FILE: &str = "table.csv";

/// Column used to detect rows already present in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    Pmcid,
    SynapseId,
}

impl DedupKey {
    fn of<'a>(&self, row: &'a FindingRow) -> &'a str {
        match self {
            Self::Pmcid => &row.pmcid,
            Self::SynapseId => &row.synapse_id,
        }
    }
}

/// Upload errors
#[derive(Debug)]
pub enum UploadError {
    Io(io::Error),
    Csv(csv::Error),
    /// Destination escapes the uploader root
    Destination(String),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "upload IO error: {e}"),
            Self::Csv(e) => write!(f, "table write error: {e}"),
            Self::Destination(d) => write!(f, "invalid destination: {d}"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Csv(e) => Some(e),
            Self::Destination(_) => None,
        }
    }
}

impl From<io::Error> for UploadError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for UploadError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

/// Destination for produced results
pub trait Uploader {
    /// Store `path` under `destination` (a relative path).
    fn upload(&self, path: &Path, destination: &str) -> Result<(), UploadError>;

    /// Append `rows` whose `key` is not yet present. Returns rows appended.
    fn append_rows_dedup_by_key(
        &self,
        rows: &[FindingRow],
        key: DedupKey,
    ) -> Result<usize, UploadError>;
}

/// Uploader backed by a local directory
#[derive(Debug, Clone)]
pub struct DirUploader {
    root: PathBuf,
}

impl DirUploader {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self) -> PathBuf {
        self.root.join(TABLE_FILE)
    }

    fn resolve(&self, destination: &str) -> Result<PathBuf, UploadError> {
        let rel = Path::new(destination);
        let valid = !destination.is_empty()
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(UploadError::Destination(destination.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl Uploader for DirUploader {
    fn upload(&self, path: &Path, destination: &str) -> Result<(), UploadError> {
        let dest = self.resolve(destination)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = dest.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        if let Err(e) = fs::copy(path, &tmp).and_then(|_| fs::rename(&tmp, &dest)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        log::debug!("Uploaded {} -> {}", path.display(), dest.display());
        Ok(())
    }

    fn append_rows_dedup_by_key(
        &self,
        rows: &[FindingRow],
        key: DedupKey,
    ) -> Result<usize, UploadError> {
        let table = self.table_path();
        let existing: HashSet<String> = if table.exists() {
            read_rows(&table)?
                .iter()
                .map(|r| key.of(r).to_string())
                .collect()
        } else {
            HashSet::new()
        };

        // Rows within one call sharing a key are all kept
        let new_rows: Vec<&FindingRow> = rows
            .iter()
            .filter(|r| !existing.contains(key.of(r)))
            .collect();
        if new_rows.is_empty() {
            return Ok(0);
        }

        let file = OpenOptions::new().create(true).append(true).open(&table)?;
        let is_new = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(io::BufWriter::new(file));
        for row in &new_rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| io::Error::other(e.to_string()))?
            .into_inner()
            .map_err(|e| e.into_error())?;
        file.sync_all()?;

        log::info!(
            "Appended {} new row(s) to {} ({} already present)",
            new_rows.len(),
            table.display(),
            rows.len() - new_rows.len()
        );
        Ok(new_rows.len())
    }
}

/// Publish statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    pub files: usize,
    pub rows_appended: usize,
}

/// Upload each batch file under `prefix` and append its rows to the table.
///
/// Stops at the first error.
pub fn publish<'a, U: Uploader + ?Sized>(
    uploader: &U,
    batch_files: impl IntoIterator<Item = &'a PathBuf>,
    prefix: &str,
) -> Result<PublishStats, UploadError> {
    let mut stats = PublishStats::default();
    for path in batch_files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Err(UploadError::Destination(path.display().to_string()));
        };
        let destination = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", prefix.trim_end_matches('/'))
        };
        uploader.upload(path, &destination)?;

        let rows = read_rows(path)?;
        stats.rows_appended += uploader.append_rows_dedup_by_key(&rows, DedupKey::Pmcid)?;
        stats.files += 1;
    }
    Ok(stats)
}
