//! Remote run orchestration
//!
//! Lists the archive, selects bundles, processes them on a bounded worker
//! pool, and computes the advanced tracking state.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use synmine_core::{
    ProgressContext, ResultSink, StreamError, WorkQueue, cleanup_tmp_files, is_shutdown_requested,
};
use synmine_text::{ConfigError, PatternMatcher};

use crate::config::Config;
use crate::manifest::{UnknownStart, WorkUnit, fetch_listing, select_units};
use crate::tracker::TrackingState;
use crate::worker::{UnitContext, UnitError, UnitStage, UnitStats, process_unit};

/// Why a unit did not succeed
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub stage: UnitStage,
    pub message: String,
}

/// Result of one attempted unit
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub name: String,
    pub start_pmc_id: String,
    pub result: Result<UnitStats, UnitFailure>,
}

impl UnitOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a remote run
#[derive(Debug)]
pub struct RunReport {
    /// Units selected after start/limit filtering
    pub selected: usize,
    pub attempted: usize,
    pub succeeded: usize,
    /// Successes whose results were committed by an earlier run
    pub already_committed: usize,
    pub failed: usize,
    pub findings_written: usize,
    pub articles_scanned: usize,
    pub elapsed: Duration,
    /// Attempted units in listing order
    pub outcomes: Vec<UnitOutcome>,
    /// Tracking state to persist once the results are durable
    pub tracker: TrackingState,
    /// Stopped early by a signal
    pub interrupted: bool,
}

impl RunReport {
    pub fn empty(tracker: TrackingState) -> Self {
        Self {
            selected: 0,
            attempted: 0,
            succeeded: 0,
            already_committed: 0,
            failed: 0,
            findings_written: 0,
            articles_scanned: 0,
            elapsed: Duration::ZERO,
            outcomes: Vec::new(),
            tracker,
            interrupted: false,
        }
    }

    /// Batch files produced by successful units
    pub fn batch_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|s| &s.batch_path)
    }

    pub fn log(&self) {
        log::info!("=== Remote Run Summary ===");
        log::info!(
            "Bundles: {}/{} succeeded ({} failed, {} selected)",
            self.succeeded,
            self.attempted,
            self.failed,
            self.selected
        );
        if self.already_committed > 0 {
            log::info!(
                "Bundles already committed by an earlier run: {}",
                self.already_committed
            );
        }
        log::info!(
            "Findings: {} from {} articles",
            self.findings_written,
            self.articles_scanned
        );
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.interrupted {
            log::warn!("Run interrupted; remaining bundles were not attempted");
        }
        for o in &self.outcomes {
            if let Err(f) = &o.result {
                log::warn!("  {} failed during {}: {}", o.name, f.stage, f.message);
            }
        }
    }
}

/// Run-scoped failures
#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    /// Output or download directory could not be prepared
    Setup(io::Error),
    /// Listing unreachable after retries
    Listing(StreamError),
    /// `start_from` matches nothing in the listing
    Selection(UnknownStart),
    /// Sink failure or fail-fast; carries what was completed before stopping
    Aborted {
        reason: String,
        report: Box<RunReport>,
    },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::Setup(e) => write!(f, "setup failed: {e}"),
            Self::Listing(e) => write!(f, "listing failed: {e}"),
            Self::Selection(e) => write!(f, "invalid start: {e}"),
            Self::Aborted { reason, .. } => write!(f, "run aborted: {reason}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Setup(e) => Some(e),
            Self::Listing(e) => Some(e),
            Self::Selection(e) => Some(e),
            Self::Aborted { .. } => None,
        }
    }
}

impl RunError {
    /// Partial report of an aborted run
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Aborted { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Advance the tracker to the last unit of the contiguous success prefix
/// (listing order). `outcomes[i]` is `None` when unit `i` was never attempted.
pub fn contiguous_advance(
    tracker: TrackingState,
    outcomes: &[Option<UnitOutcome>],
) -> TrackingState {
    let last = outcomes
        .iter()
        .map_while(|o| o.as_ref().filter(|o| o.is_success()))
        .last();
    match last {
        Some(o) => tracker.advanced_to(&o.start_pmc_id),
        None => tracker,
    }
}

/// Run the remote pipeline.
///
/// `tracker` is the state loaded by the caller; the advanced state comes back
/// in the report (or inside [`RunError::Aborted`]) for the caller to persist.
pub fn run(
    config: &Config,
    tracker: TrackingState,
    progress: &ProgressContext,
) -> Result<RunReport, RunError> {
    let start = Instant::now();
    config.miner.validate().map_err(RunError::Config)?;

    let sink = ResultSink::new(&config.output).map_err(RunError::Setup)?;
    if let Err(e) = cleanup_tmp_files(&config.output) {
        log::warn!("Failed to clean stale tmp files: {e}");
    }

    let listing_pb = progress.unit_bar("listing");
    let listing = fetch_listing(&config.base_url, &config.retry, &listing_pb);
    listing_pb.finish_and_clear();
    let units = select_units(
        listing.map_err(RunError::Listing)?,
        config.start_from.as_deref(),
        tracker.last_processed_pmc_id.as_deref(),
        config.max_files,
    )
    .map_err(RunError::Selection)?;

    if units.is_empty() {
        log::warn!("No bundles to process");
        return Ok(RunReport::empty(tracker));
    }

    // Keep the temp dir alive for the whole run
    let (_temp_guard, download_dir) = match &config.download_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(RunError::Setup)?;
            (None, dir.clone())
        }
        None => {
            let tmp = tempfile::Builder::new()
                .prefix("synmine-")
                .tempdir()
                .map_err(RunError::Setup)?;
            let path = tmp.path().to_path_buf();
            (Some(tmp), path)
        }
    };

    let workers = config.miner.workers.min(units.len()).max(1);
    log::info!("Processing {} bundles with {} workers", units.len(), workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| RunError::Setup(io::Error::other(e)))?;

    let selected = units.len();
    let queue: WorkQueue<WorkUnit> = WorkQueue::new(units);
    let outcomes: Mutex<Vec<Option<UnitOutcome>>> = Mutex::new(vec![None; selected]);
    let abort: Mutex<Option<String>> = Mutex::new(None);
    let sink = Mutex::new(sink);
    let matcher = PatternMatcher::from_config(&config.miner);
    let ctx = UnitContext {
        download_dir: &download_dir,
        matcher: &matcher,
        batch_size: config.miner.batch_size,
        retry: &config.retry,
        sink: &sink,
    };
    let overall = progress.overall_bar(selected, "remote");

    pool.install(|| {
        rayon::scope(|s| {
            for _ in 0..workers {
                s.spawn(|_| {
                    loop {
                        if is_shutdown_requested() {
                            queue.halt();
                            break;
                        }
                        let Some((idx, unit)) = queue.next() else {
                            break;
                        };

                        let pb = progress.unit_bar(&unit.name);
                        let result = process_unit(unit, &ctx, &pb);
                        pb.finish_and_clear();
                        overall.inc(1);

                        let result = match result {
                            Ok(stats) => {
                                stats.log();
                                Ok(stats)
                            }
                            Err(e) => {
                                log::error!("{} failed during {}: {e}", unit.name, e.stage());
                                if e.is_run_fatal() || config.fail_fast {
                                    queue.halt();
                                    let mut abort = abort.lock().unwrap_or_else(|p| p.into_inner());
                                    abort.get_or_insert_with(|| format!("{}: {e}", unit.name));
                                }
                                Err(unit_failure(&e))
                            }
                        };

                        let outcome = UnitOutcome {
                            name: unit.name.clone(),
                            start_pmc_id: unit.start_pmc_id(),
                            result,
                        };
                        outcomes.lock().unwrap_or_else(|p| p.into_inner())[idx] = Some(outcome);
                    }
                });
            }
        });
    });
    overall.finish_and_clear();

    let outcomes = outcomes.into_inner().unwrap_or_else(|p| p.into_inner());
    let tracker = contiguous_advance(tracker, &outcomes);
    let attempted: Vec<UnitOutcome> = outcomes.into_iter().flatten().collect();
    let succeeded: Vec<&UnitStats> = attempted
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .collect();
    let already_committed = succeeded.iter().filter(|s| s.already_committed).count();
    let findings_written: usize = succeeded.iter().map(|s| s.findings).sum();
    let articles_scanned: usize = succeeded.iter().map(|s| s.articles).sum();
    let succeeded = succeeded.len();

    let report = RunReport {
        selected,
        attempted: attempted.len(),
        succeeded,
        already_committed,
        failed: attempted.len() - succeeded,
        findings_written,
        articles_scanned,
        elapsed: start.elapsed(),
        outcomes: attempted,
        tracker,
        interrupted: is_shutdown_requested(),
    };
    report.log();

    match abort.into_inner().unwrap_or_else(|p| p.into_inner()) {
        Some(reason) => Err(RunError::Aborted {
            reason,
            report: Box::new(report),
        }),
        None => Ok(report),
    }
}

fn unit_failure(e: &UnitError) -> UnitFailure {
    UnitFailure {
        stage: e.stage(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(start: u64, ok: bool) -> Option<UnitOutcome> {
        let result = if ok {
            Ok(UnitStats {
                name: format!("PMC{start}_PMC{}.xml.gz", start + 9),
                bytes: 0,
                articles: 0,
                skipped_articles: 0,
                findings: 0,
                batch_path: PathBuf::new(),
                already_committed: false,
                elapsed: Duration::ZERO,
            })
        } else {
            Err(UnitFailure {
                stage: UnitStage::Fetching,
                message: "HTTP 404".into(),
            })
        };
        Some(UnitOutcome {
            name: format!("PMC{start}_PMC{}.xml.gz", start + 9),
            start_pmc_id: format!("PMC{start}"),
            result,
        })
    }

    #[test]
    fn advance_through_all_successes() {
        let outcomes = vec![outcome(1, true), outcome(10, true), outcome(20, true)];
        let t = contiguous_advance(TrackingState::default(), &outcomes);
        assert_eq!(t.last_processed_pmc_id.as_deref(), Some("PMC20"));
    }

    #[test]
    fn advance_stops_before_failure() {
        let outcomes = vec![outcome(1, true), outcome(10, false), outcome(20, true)];
        let t = contiguous_advance(TrackingState::default(), &outcomes);
        assert_eq!(t.last_processed_pmc_id.as_deref(), Some("PMC1"));
    }

    #[test]
    fn advance_stops_before_unattempted() {
        let outcomes = vec![outcome(1, true), None, outcome(20, true)];
        let t = contiguous_advance(TrackingState::default(), &outcomes);
        assert_eq!(t.last_processed_pmc_id.as_deref(), Some("PMC1"));
    }

    #[test]
    fn no_advance_when_first_fails() {
        let start = TrackingState::default().advanced_to("PMC0");
        let outcomes = vec![outcome(1, false), outcome(10, true)];
        let t = contiguous_advance(start.clone(), &outcomes);
        assert_eq!(t, start);
    }

    #[test]
    fn empty_report() {
        let report = RunReport::empty(TrackingState::default());
        assert_eq!(report.attempted, 0);
        assert_eq!(report.batch_files().count(), 0);
        report.log();
    }
}
