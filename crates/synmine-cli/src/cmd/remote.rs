//! Remote subcommand - mine bundles from the PMC archive

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use synmine_core::SharedProgress;
use synmine_core::progress::fmt_num;
use synmine_pmc::{RunError, RunReport, tracker};

use crate::Settings;

#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Directory listing URL of the archive
    #[arg(short = 'u', long)]
    pub base_url: Option<String>,

    /// Main output CSV (batch files are written next to it)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Bundle name or PMC range to start from (ignores the tracking file)
    #[arg(short, long)]
    pub start_from: Option<String>,

    /// Maximum number of bundles to process
    #[arg(short, long)]
    pub max_files: Option<usize>,

    /// Resume state file
    #[arg(long)]
    pub tracking_file: Option<PathBuf>,

    /// Stop claiming bundles after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Keep downloads here instead of a temporary directory
    #[arg(long)]
    pub download_dir: Option<PathBuf>,
}

impl RemoteArgs {
    pub fn to_config(&self, settings: &Settings) -> synmine_pmc::Config {
        let remote = &settings.config.remote;
        synmine_pmc::Config {
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| remote.base_url.clone()),
            output: self.output.clone().unwrap_or_else(|| remote.output.clone()),
            start_from: self.start_from.clone(),
            max_files: self.max_files,
            miner: settings.miner.clone(),
            retry: remote.retry(),
            fail_fast: self.fail_fast,
            tracking_file: self
                .tracking_file
                .clone()
                .unwrap_or_else(|| remote.tracking_file.clone()),
            download_dir: self.download_dir.clone(),
        }
    }
}

/// Start a remote run with the persisted resume point.
pub fn start(
    config: &synmine_pmc::Config,
    progress: &SharedProgress,
) -> Result<RunReport, RunError> {
    log::info!("Mining remote archive {}", config.base_url);
    log::info!("  Output: {}", config.output.display());
    if let Some(from) = &config.start_from {
        log::info!("  Start from: {from}");
    }
    if let Some(max) = config.max_files {
        log::info!("  Max files: {max}");
    }

    let state = tracker::load(&config.tracking_file);
    if let Some(last) = &state.last_processed_pmc_id {
        log::info!("  Last processed: {last}");
    }
    synmine_pmc::run(config, state, progress)
}

pub fn run(args: RemoteArgs, settings: &Settings, progress: &SharedProgress) -> Result<()> {
    let config = args.to_config(settings);

    match start(&config, progress) {
        Ok(report) => {
            save_tracker(&config, &report)?;
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            // Units completed before the abort are durable; keep their progress
            if let Some(report) = err.report() {
                save_tracker(&config, report)?;
                print_report(report);
            }
            Err(err).context("Remote run failed")
        }
    }
}

pub fn save_tracker(config: &synmine_pmc::Config, report: &RunReport) -> Result<()> {
    tracker::save(&config.tracking_file, &report.tracker).with_context(|| {
        format!(
            "Failed to save tracking file {}",
            config.tracking_file.display()
        )
    })
}

pub fn print_report(report: &RunReport) {
    super::print_summary(
        "Remote run",
        &[
            (
                "Bundles",
                format!(
                    "{}/{} ({} failed, {} selected)",
                    report.succeeded, report.attempted, report.failed, report.selected
                ),
            ),
            ("Already committed", fmt_num(report.already_committed)),
            ("Articles", fmt_num(report.articles_scanned)),
            ("Findings", fmt_num(report.findings_written)),
            (
                "Resume point",
                report
                    .tracker
                    .last_processed_pmc_id
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("Time", format!("{:.1}s", report.elapsed.as_secs_f64())),
        ],
    );
}
