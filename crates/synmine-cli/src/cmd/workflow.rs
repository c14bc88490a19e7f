//! Workflow subcommand - remote run, publish, then persist the resume point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use synmine_core::SharedProgress;
use synmine_pmc::{DirUploader, RunReport, publish};

use super::remote::{self, RemoteArgs};
use crate::Settings;

#[derive(Args, Debug)]
pub struct WorkflowArgs {
    #[command(flatten)]
    pub remote: RemoteArgs,

    /// Destination directory for batch files and the row table
    #[arg(long)]
    pub dest_dir: PathBuf,

    /// Subdirectory of the destination for batch files
    #[arg(long, default_value = "batches")]
    pub prefix: String,
}

pub fn run(args: WorkflowArgs, settings: &Settings, progress: &SharedProgress) -> Result<()> {
    let config = args.remote.to_config(settings);
    let uploader = DirUploader::new(&args.dest_dir)
        .with_context(|| format!("Failed to open destination {}", args.dest_dir.display()))?;

    match remote::start(&config, progress) {
        Ok(report) => finish(&report, &uploader, &args.prefix, &config),
        Err(err) => {
            if let Some(report) = err.report() {
                finish(report, &uploader, &args.prefix, &config)?;
            }
            Err(err).context("Remote run failed")
        }
    }
}

/// Publish, then save the tracker.
///
/// A failed upload leaves the tracker untouched. The next run then finds the
/// same bundles already committed, appends nothing to the main file, and
/// publishes their batch files again.
fn finish(
    report: &RunReport,
    uploader: &DirUploader,
    prefix: &str,
    config: &synmine_pmc::Config,
) -> Result<()> {
    let stats = publish(uploader, report.batch_files(), prefix).with_context(|| {
        format!("Upload to {} failed", uploader.root().display())
    })?;
    log::info!(
        "Published {} batch file(s), {} new row(s) to {}",
        stats.files,
        stats.rows_appended,
        uploader.root().display()
    );

    remote::save_tracker(config, report)?;
    remote::print_report(report);
    Ok(())
}
