//! Process subcommand - mine local files

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use synmine_core::SharedProgress;
use synmine_core::progress::fmt_num;
use synmine_text::{LocalReport, process_path};

use crate::Settings;

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// File or directory to scan
    pub path: PathBuf,

    /// Output file
    #[arg(short, long, default_value = "results.csv")]
    pub output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "csv")]
    pub format: OutputFormat,

    /// Allowed extensions (repeatable, e.g. -e pdf -e txt)
    #[arg(short, long = "extension")]
    pub extensions: Vec<String>,

    /// Process files one at a time
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

pub fn run(args: ProcessArgs, settings: &Settings, progress: &SharedProgress) -> Result<()> {
    let mut miner = settings.miner.clone();
    if !args.extensions.is_empty() {
        miner = miner.with_extensions(&args.extensions);
    }

    log::info!("Processing {}", args.path.display());
    log::info!("  Output: {} ({:?})", args.output.display(), args.format);

    let report = process_path(&args.path, &miner, args.sequential, progress)?;

    let written = match args.format {
        OutputFormat::Csv => synmine_core::write_csv(&args.output, &report.findings),
        OutputFormat::Json => synmine_core::write_json(&args.output, &report.findings),
    };
    written.with_context(|| format!("Failed to write {}", args.output.display()))?;

    print_report(&report, &args.output);
    Ok(())
}

fn print_report(report: &LocalReport, output: &std::path::Path) {
    let summary = &report.summary;
    super::print_summary(
        "Local run",
        &[
            (
                "Files",
                format!(
                    "{} processed ({} failed)",
                    report.files_processed, report.files_failed
                ),
            ),
            ("Documents", fmt_num(summary.documents)),
            ("Total mentions", fmt_num(summary.total_mentions)),
            ("Unique ids", fmt_num(summary.unique_ids)),
            ("Output", output.display().to_string()),
            ("Time", format!("{:.1}s", report.elapsed.as_secs_f64())),
        ],
    );

    if summary.top_ids.is_empty() {
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Top ids").fg(Color::Cyan),
            Cell::new("Documents").fg(Color::Cyan),
        ]);
    for (id, count) in &summary.top_ids {
        table.add_row(vec![Cell::new(id), Cell::new(count)]);
    }
    eprintln!("{table}");
}
