//! Bundle processing: download, scan, sink

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use synmine_core::progress::switch_to_count;
use synmine_core::{FetchError, ResultSink, RetryPolicy, download_to_file};
use synmine_text::{ExtractError, PatternMatcher, open_decoded, scan_bundle};

use crate::manifest::WorkUnit;

/// Where in the pipeline a unit was when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStage {
    Fetching,
    Extracting,
    Sinking,
}

impl fmt::Display for UnitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetching => "fetch",
            Self::Extracting => "extract",
            Self::Sinking => "sink",
        })
    }
}

/// Error from processing one bundle
#[derive(Debug)]
pub enum UnitError {
    Fetch(FetchError),
    Extract(ExtractError),
    /// Result write failed; the whole run stops
    Sink(io::Error),
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "{e}"),
            Self::Extract(e) => write!(f, "{e}"),
            Self::Sink(e) => write!(f, "write failed: {e}"),
        }
    }
}

impl std::error::Error for UnitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Extract(e) => Some(e),
            Self::Sink(e) => Some(e),
        }
    }
}

impl UnitError {
    pub fn stage(&self) -> UnitStage {
        match self {
            Self::Fetch(_) => UnitStage::Fetching,
            Self::Extract(_) => UnitStage::Extracting,
            Self::Sink(_) => UnitStage::Sinking,
        }
    }

    /// Sink failures end the run; everything else only fails the unit.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Sink(_))
    }
}

/// Statistics from processing a single bundle
#[derive(Debug, Clone)]
pub struct UnitStats {
    pub name: String,
    pub bytes: u64,
    pub articles: usize,
    pub skipped_articles: usize,
    /// Rows appended to the main file by this run
    pub findings: usize,
    pub batch_path: PathBuf,
    pub elapsed: Duration,
    /// Batch file already present; nothing was fetched or written
    pub already_committed: bool,
}

impl UnitStats {
    /// Log stats for non-TTY output
    pub fn log(&self) {
        if self.already_committed {
            log::info!(
                "{}: already committed in {}",
                self.name,
                self.batch_path.display()
            );
            return;
        }
        log::info!(
            "{}: {} finding(s) from {} article(s) ({} skipped) in {:.1}s",
            self.name,
            self.findings,
            self.articles,
            self.skipped_articles,
            self.elapsed.as_secs_f64()
        );
    }
}

/// Local download removed when dropped, on every exit path
struct LocalCopy {
    path: PathBuf,
}

impl LocalCopy {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LocalCopy {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed downloaded file: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// Shared, per-run inputs for [`process_unit`]
pub struct UnitContext<'a> {
    pub download_dir: &'a Path,
    pub matcher: &'a PatternMatcher,
    pub batch_size: usize,
    pub retry: &'a RetryPolicy,
    pub sink: &'a Mutex<ResultSink>,
}

/// Download one bundle with retries, scan it, and sink its findings.
///
/// A bundle whose batch file already exists was sunk by an earlier run and
/// is reported as committed without being fetched again.
pub fn process_unit(
    unit: &WorkUnit,
    ctx: &UnitContext<'_>,
    pb: &ProgressBar,
) -> Result<UnitStats, UnitError> {
    let start = Instant::now();
    let committed = ctx
        .sink
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .committed_batch(&unit.name);
    if let Some(batch_path) = committed {
        return Ok(UnitStats {
            name: unit.name.clone(),
            bytes: 0,
            articles: 0,
            skipped_articles: 0,
            findings: 0,
            batch_path,
            elapsed: start.elapsed(),
            already_committed: true,
        });
    }

    let local = LocalCopy::new(ctx.download_dir.join(&unit.name));

    if let Some(size) = unit.size_bytes {
        log::debug!("{}: ~{} bytes", unit.name, size);
    }
    let bytes = ctx
        .retry
        .run(&unit.name, pb, |attempt| {
            if attempt > 1 {
                pb.set_position(0);
            }
            download_to_file(&unit.url, local.path(), pb)
        })
        .map_err(UnitError::Fetch)?;

    switch_to_count(pb);
    pb.set_message("matching...");
    let reader = open_decoded(local.path()).map_err(|e| UnitError::Extract(e.into()))?;
    let scan = scan_bundle(reader, ctx.matcher, ctx.batch_size, pb).map_err(UnitError::Extract)?;

    pb.set_message("writing...");
    let batch_path = {
        let mut sink = ctx.sink.lock().unwrap_or_else(|e| e.into_inner());
        sink.append(&unit.name, &scan.findings)
            .map_err(UnitError::Sink)?
    };
    drop(local);

    Ok(UnitStats {
        name: unit.name.clone(),
        bytes,
        articles: scan.articles,
        skipped_articles: scan.skipped,
        findings: scan.findings.len(),
        batch_path,
        elapsed: start.elapsed(),
        already_committed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_copy_removed_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("PMC1_PMC2.xml.gz");
        std::fs::write(&path, b"x").unwrap();
        {
            let _copy = LocalCopy::new(path.clone());
        }
        assert!(!path.exists());
    }

    #[test]
    fn local_copy_missing_file_is_fine() {
        let dir = tempfile::TempDir::new().unwrap();
        drop(LocalCopy::new(dir.path().join("never-downloaded")));
    }

    #[test]
    fn only_sink_errors_are_run_fatal() {
        let sink = UnitError::Sink(io::Error::other("disk"));
        assert!(sink.is_run_fatal());
        assert_eq!(sink.stage(), UnitStage::Sinking);

        let extract = UnitError::Extract(ExtractError::UnsupportedFormat("zip".into()));
        assert!(!extract.is_run_fatal());
        assert_eq!(extract.stage().to_string(), "extract");
    }

    #[test]
    fn unit_stats_log_does_not_panic() {
        let stats = UnitStats {
            name: "PMC1_PMC2.xml.gz".into(),
            bytes: 10,
            articles: 2,
            skipped_articles: 0,
            findings: 1,
            batch_path: PathBuf::from("results.csv.PMC1_PMC2.xml.gz.csv"),
            elapsed: Duration::from_secs(1),
            already_committed: false,
        };
        stats.log();
    }

    #[test]
    fn committed_unit_is_not_fetched() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut sink = ResultSink::new(&dir.path().join("results.csv")).unwrap();
        let name = "PMC1_PMC2.xml.gz";
        let batch = sink.append(name, &[]).unwrap();

        let unit = WorkUnit {
            name: name.into(),
            // Nothing listens here; a fetch attempt would fail the unit
            url: "http://127.0.0.1:9/PMC1_PMC2.xml.gz".into(),
            size_bytes: None,
            start_id: 1,
            end_id: 2,
        };
        let matcher = PatternMatcher::new(10, true);
        let retry = RetryPolicy::new(1, Duration::ZERO);
        let sink = Mutex::new(sink);
        let ctx = UnitContext {
            download_dir: dir.path(),
            matcher: &matcher,
            batch_size: 10,
            retry: &retry,
            sink: &sink,
        };

        let stats = process_unit(&unit, &ctx, &ProgressBar::hidden()).unwrap();
        assert!(stats.already_committed);
        assert_eq!(stats.batch_path, batch);
        assert_eq!(stats.findings, 0);
        assert_eq!(sink.into_inner().unwrap().rows_written(), 0);
    }
}
