//! Tracker subcommand - inspect or override the resume point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use synmine_pmc::manifest::pmc_number;
use synmine_pmc::tracker;

use crate::Settings;

#[derive(Args, Debug)]
pub struct TrackerArgs {
    #[command(subcommand)]
    pub action: TrackerAction,

    /// Resume state file
    #[arg(long, global = true)]
    pub tracking_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum TrackerAction {
    /// Print the stored resume point
    Show,
    /// Set the resume point (may move it backwards)
    Set {
        /// PMC id, e.g. PMC11890001
        id: String,
    },
}

pub fn run(args: TrackerArgs, settings: &Settings) -> Result<()> {
    let path = args
        .tracking_file
        .unwrap_or_else(|| settings.config.remote.tracking_file.clone());

    match args.action {
        TrackerAction::Show => {
            let state = tracker::try_load(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            super::print_summary(
                "Tracker",
                &[
                    ("File", path.display().to_string()),
                    (
                        "Last processed",
                        state
                            .last_processed_pmc_id
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                    (
                        "Updated",
                        state
                            .updated_at
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                ],
            );
            Ok(())
        }
        TrackerAction::Set { id } => {
            let Some(number) = pmc_number(&id) else {
                anyhow::bail!("not a PMC id: {id}");
            };
            let state = tracker::load(&path).overridden_to(&format!("PMC{number}"));
            tracker::save(&path, &state)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(())
        }
    }
}
