//! Combine subcommand - merge batch files

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use synmine_core::progress::fmt_num;
use synmine_pmc::combine::DEFAULT_PATTERN;

#[derive(Args, Debug)]
pub struct CombineArgs {
    /// Combined output file
    #[arg(short, long, default_value = "combined_results.csv")]
    pub output: PathBuf,

    /// Directory containing the batch files
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Glob pattern for batch files
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,
}

pub fn run(args: CombineArgs) -> Result<()> {
    let stats = synmine_pmc::combine(&args.dir, &args.pattern, &args.output)?;

    super::print_summary(
        "Combine",
        &[
            ("Files", stats.files.to_string()),
            ("Rows read", fmt_num(stats.rows_read)),
            ("Duplicates dropped", fmt_num(stats.duplicates)),
            ("Rows written", fmt_num(stats.rows_written)),
            ("Output", args.output.display().to_string()),
        ],
    );
    Ok(())
}
