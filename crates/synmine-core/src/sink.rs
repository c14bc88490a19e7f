//! Output sinks: per-unit batch CSVs and the append-only main CSV

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::finding::{Finding, FindingRow};

/// Writes batch files atomically (tmp→rename) and appends to the main file.
///
/// Every [`append`](ResultSink::append) is durable (flushed and synced) when it
/// returns, so a crash loses at most the unit being written. The batch file
/// lands after the main rows and marks the unit as committed.
#[derive(Debug)]
pub struct ResultSink {
    main_path: PathBuf,
    rows_written: usize,
}

impl ResultSink {
    pub fn new(main_path: &Path) -> io::Result<Self> {
        if let Some(parent) = main_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            main_path: main_path.to_path_buf(),
            rows_written: 0,
        })
    }

    /// `{main_path}.{unit_name}.csv`
    pub fn batch_path(&self, unit_name: &str) -> PathBuf {
        let mut name = self.main_path.as_os_str().to_owned();
        name.push(format!(".{unit_name}.csv"));
        PathBuf::from(name)
    }

    pub fn main_path(&self) -> &Path {
        &self.main_path
    }

    /// Rows appended to the main file through this sink
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Batch file of a unit whose rows are already in the main file
    pub fn committed_batch(&self, unit_name: &str) -> Option<PathBuf> {
        let path = self.batch_path(unit_name);
        path.is_file().then_some(path)
    }

    /// Append the rows to the main file, then write the unit's batch file.
    pub fn append(&mut self, unit_name: &str, findings: &[Finding]) -> io::Result<PathBuf> {
        self.append_main(findings)?;
        self.finalize_batch(unit_name, findings)
    }

    /// Create the unit's batch file (header-only when there are no findings).
    pub fn finalize_batch(&self, unit_name: &str, findings: &[Finding]) -> io::Result<PathBuf> {
        let path = self.batch_path(unit_name);
        write_csv(&path, findings)?;
        Ok(path)
    }

    fn append_main(&mut self, findings: &[Finding]) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.main_path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(BufWriter::new(file));
        if needs_header && findings.is_empty() {
            writer.write_record(CSV_HEADER)?;
        }
        for f in findings {
            writer.serialize(f.to_row())?;
        }
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| io::Error::other(e.to_string()))?
            .into_inner()
            .map_err(|e| e.into_error())?;
        file.sync_all()?;

        self.rows_written += findings.len();
        Ok(())
    }
}

/// CSV header, in column order
pub const CSV_HEADER: [&str; 3] = ["pmcid", "synapse_id", "context"];

/// Write findings as a complete CSV file via tmp→rename.
pub fn write_csv(path: &Path, findings: &[Finding]) -> io::Result<()> {
    let tmp = tmp_path(path);
    let result = (|| {
        let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(&tmp)?));
        if findings.is_empty() {
            writer.write_record(CSV_HEADER)?;
        }
        for f in findings {
            writer.serialize(f.to_row())?;
        }
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| io::Error::other(e.to_string()))?
            .into_inner()
            .map_err(|e| e.into_error())?;
        file.sync_all()
    })();
    finish_tmp(&tmp, path, result)
}

/// JSON view of a finding (adds the joined context)
#[derive(Serialize)]
struct JsonFinding<'a> {
    #[serde(flatten)]
    finding: &'a Finding,
    context: String,
}

/// Write findings as a pretty JSON array via tmp→rename.
pub fn write_json(path: &Path, findings: &[Finding]) -> io::Result<()> {
    let tmp = tmp_path(path);
    let result = (|| {
        let view: Vec<JsonFinding<'_>> = findings
            .iter()
            .map(|f| JsonFinding {
                finding: f,
                context: f.context(),
            })
            .collect();
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, &view).map_err(io::Error::other)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_all()
    })();
    finish_tmp(&tmp, path, result)
}

/// Read back rows written by [`ResultSink`] or [`write_csv`].
pub fn read_rows(path: &Path) -> io::Result<Vec<FindingRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<FindingRow>, csv::Error>>()?;
    Ok(rows)
}

/// Remove stale `{main_path}.*.tmp` files left by an interrupted run.
pub fn cleanup_tmp_files(main_path: &Path) -> io::Result<()> {
    let dir = match main_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let Some(prefix) = main_path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(());
    };
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_stale = path.file_name().is_some_and(|n| {
            let n = n.to_string_lossy();
            n.starts_with(&prefix) && n.ends_with(".tmp")
        });
        if is_stale {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// `{path}.tmp`, keeping every extension of `path`
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn finish_tmp(tmp: &Path, path: &Path, result: io::Result<()>) -> io::Result<()> {
    match result {
        Ok(()) => fs::rename(tmp, path),
        Err(e) => {
            let _ = fs::remove_file(tmp);
            Err(e)
        }
    }
}
