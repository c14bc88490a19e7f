//! Synmine PMC - remote open-access archive pipeline
//!
//! Lists the PMC bundle archive over HTTP, downloads each `.xml.gz` bundle,
//! scans its articles for Synapse identifiers and writes per-bundle and
//! aggregate CSV results. A tracking file makes repeated runs resume where
//! the last one stopped.
//!
//! # Example
//!
//! ```no_run
//! use synmine_core::ProgressContext;
//! use synmine_pmc::{Config, run, tracker};
//!
//! let config = Config {
//!     max_files: Some(2),
//!     ..Default::default()
//! };
//!
//! let state = tracker::load(&config.tracking_file);
//! let report = run(&config, state, &ProgressContext::new()).expect("run failed");
//! tracker::save(&config.tracking_file, &report.tracker).expect("save failed");
//! ```

pub mod combine;
pub mod config;
pub mod manifest;
pub mod runner;
pub mod tracker;
pub mod upload;
pub mod worker;

// Re-exports
pub use combine::{CombineStats, combine};
pub use config::{Config, DEFAULT_BASE_URL, DEFAULT_OUTPUT};
pub use manifest::{UnknownStart, WorkUnit, fetch_listing, parse_listing, select_units};
pub use runner::{RunError, RunReport, UnitFailure, UnitOutcome, run};
pub use tracker::{TrackingError, TrackingState, extract_start_id};
pub use upload::{DedupKey, DirUploader, PublishStats, UploadError, Uploader, publish};
pub use worker::{UnitError, UnitStage, UnitStats};
