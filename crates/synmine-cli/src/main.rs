//! synmine - Synapse identifier miner
//!
//! Scans scientific articles, local or from the PMC open-access archive,
//! for Synapse ids and records each mention with its surrounding context.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

mod cmd;
mod config;

use config::{Config, Overrides};

#[derive(Parser)]
#[command(name = "synmine")]
#[command(about = "Mine Synapse identifiers from scientific articles")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file path (default: ./synmine.toml or ~/.config/synmine/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Characters of context captured on each side of a match
    #[arg(long, global = true)]
    context_size: Option<usize>,

    /// Keep every occurrence instead of the first per document
    #[arg(long, global = true)]
    no_dedup: bool,

    /// Number of parallel workers
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Mine a local file or directory
    Process(cmd::process::ProcessArgs),
    /// Mine bundles from the remote PMC archive
    Remote(cmd::remote::RemoteArgs),
    /// Remote run, then publish batch files and new rows
    Workflow(cmd::workflow::WorkflowArgs),
    /// Merge batch CSV files into one
    Combine(cmd::combine::CombineArgs),
    /// Inspect or override the resume point
    Tracker(cmd::tracker::TrackerArgs),
    /// Show current configuration
    Config,
}

/// Resolved settings handed to every subcommand
pub struct Settings {
    pub config: Config,
    pub miner: synmine_text::MinerConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(synmine_core::ProgressContext::new());

    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    synmine_core::init_logging(
        synmine_core::default_filter(cli.verbose, cli.debug, is_tty),
        multi,
    );

    if let Err(e) = synmine_core::install_signal_handlers() {
        log::warn!("Failed to install signal handlers: {e}");
    }

    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    synmine_core::set_http_config(config.http(cli.read_timeout));

    let overrides = Overrides {
        context_size: cli.context_size,
        no_dedup: cli.no_dedup,
        workers: cli.workers,
    };
    let settings = Settings {
        miner: config.miner(&overrides),
        config,
    };

    match cli.command {
        Command::Process(args) => cmd::process::run(args, &settings, &progress),
        Command::Remote(args) => cmd::remote::run(args, &settings, &progress),
        Command::Workflow(args) => cmd::workflow::run(args, &settings, &progress),
        Command::Combine(args) => cmd::combine::run(args),
        Command::Tracker(args) => cmd::tracker::run(args, &settings),
        Command::Config => {
            print_config(&settings);
            Ok(())
        }
    }
}

fn print_config(settings: &Settings) {
    let config = &settings.config;
    let miner = &settings.miner;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec!["Context size", &miner.context_size.to_string()]);
    table.add_row(vec![
        "Deduplicate",
        if miner.deduplicate { "yes" } else { "no" },
    ]);
    table.add_row(vec![
        "Workers",
        &format!("{} (max: {})", miner.workers, config.workers.max),
    ]);
    table.add_row(vec!["Batch size", &miner.batch_size.to_string()]);
    table.add_row(vec![
        "Extensions",
        &miner
            .allowed_extensions
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(" "),
    ]);
    table.add_row(vec![
        "Max file size",
        &format!("{} MB", miner.max_file_size / (1024 * 1024)),
    ]);
    table.add_row(vec!["Base URL", &config.remote.base_url]);
    table.add_row(vec!["Output", &config.remote.output.display().to_string()]);
    table.add_row(vec![
        "Tracking file",
        &config.remote.tracking_file.display().to_string(),
    ]);
    table.add_row(vec![
        "Retry",
        &format!(
            "{} attempts, {}s apart",
            config.remote.retry_attempts, config.remote.retry_delay_secs
        ),
    ]);
    let http = synmine_core::http_config();
    table.add_row(vec![
        "Read timeout",
        &format!("{}s", http.read_timeout.as_secs()),
    ]);

    if let Err(e) = miner.validate() {
        table.add_row(vec![Cell::new("Invalid").fg(Color::Red), Cell::new(e)]);
    }

    eprintln!("\n{table}");
}
