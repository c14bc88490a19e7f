//! Merge batch files into one CSV with a `source_file` column

use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use synmine_core::{FindingRow, read_rows};

/// Default batch file pattern for the default output name
pub const DEFAULT_PATTERN: &str = "results.csv.*.csv";

#[derive(Debug, Serialize)]
struct CombinedRow<'a> {
    pmcid: &'a str,
    synapse_id: &'a str,
    context: &'a str,
    source_file: &'a str,
}

/// Combine statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CombineStats {
    pub files: usize,
    pub rows_read: usize,
    pub rows_written: usize,
    pub duplicates: usize,
}

/// Part of `file_name` matched by the `*` in `pattern`; the file stem otherwise.
///
/// `results.csv.PMC1_PMC2.xml.gz.csv` with `results.csv.*.csv` → `PMC1_PMC2.xml.gz`
pub fn source_name(file_name: &str, pattern: &str) -> String {
    if let Some((prefix, suffix)) = pattern.split_once('*') {
        if !suffix.contains('*') {
            if let Some(mid) = file_name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
            {
                if !mid.is_empty() {
                    return mid.to_string();
                }
            }
        }
    }
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

/// Merge every file in `dir` matching `pattern` into `output`.
///
/// Files are read in name order. Rows identical on `(pmcid, synapse_id,
/// context)` are written once, tagged with the first file that had them.
/// `output` itself is never read as an input.
pub fn combine(dir: &Path, pattern: &str, output: &Path) -> Result<CombineStats> {
    let glob_pattern = dir.join(pattern);
    let glob_str = glob_pattern.to_string_lossy();
    let mut files: Vec<PathBuf> = glob::glob(&glob_str)
        .with_context(|| format!("invalid pattern: {pattern}"))?
        .filter_map(|entry| match entry {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|p| p.is_file() && !same_file(p, output))
        .collect();
    files.sort();

    if files.is_empty() {
        anyhow::bail!("no files matching {} in {}", pattern, dir.display());
    }
    log::info!("Combining {} file(s) into {}", files.len(), output.display());

    let mut stats = CombineStats::default();
    let mut seen: HashSet<FindingRow> = HashSet::new();
    let mut kept: Vec<(FindingRow, String)> = Vec::new();

    for path in &files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rows = read_rows(path).with_context(|| format!("reading {}", path.display()))?;
        log::debug!("{}: {} row(s)", file_name, rows.len());

        let source = source_name(&file_name, pattern);
        stats.files += 1;
        stats.rows_read += rows.len();
        for row in rows {
            if seen.contains(&row) {
                stats.duplicates += 1;
                continue;
            }
            seen.insert(row.clone());
            kept.push((row, source.clone()));
        }
    }

    write_combined(output, &kept).with_context(|| format!("writing {}", output.display()))?;
    stats.rows_written = kept.len();

    log::info!(
        "Combined {} row(s) from {} file(s), dropped {} duplicate(s)",
        stats.rows_written,
        stats.files,
        stats.duplicates
    );
    Ok(stats)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn write_combined(output: &Path, rows: &[(FindingRow, String)]) -> io::Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = output.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = (|| -> io::Result<()> {
        let mut writer = csv::Writer::from_writer(BufWriter::new(fs::File::create(&tmp)?));
        if rows.is_empty() {
            writer.write_record(["pmcid", "synapse_id", "context", "source_file"])?;
        }
        for (row, source) in rows {
            writer.serialize(CombinedRow {
                pmcid: &row.pmcid,
                synapse_id: &row.synapse_id,
                context: &row.context,
                source_file: source,
            })?;
        }
        let mut inner = writer
            .into_inner()
            .map_err(|e| io::Error::other(e.to_string()))?;
        inner.flush()?;
        Ok(())
    })();

    match result {
        Ok(()) => fs::rename(&tmp, output),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}
