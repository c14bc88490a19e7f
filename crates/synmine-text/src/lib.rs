//! Synmine Text - document extraction and identifier matching
//!
//! Turns PDF, XML (JATS), HTML and plain-text documents into searchable text
//! and scans it for Synapse identifiers.
//!
//! # Example
//!
//! ```ignore
//! use synmine_text::PatternMatcher;
//!
//! let matcher = PatternMatcher::new(25, true);
//! for finding in matcher.find("Data at syn1234567.", "doc1") {
//!     println!("{} {}", finding.synapse_id, finding.context());
//! }
//! ```

pub mod config;
pub mod format;
pub mod jats;
pub mod matcher;
pub mod miner;

/// One searchable document, alive only while its unit is processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// `pmc:PMC…` for bundle articles, the file name otherwise
    pub source_id: String,
    pub text: String,
}

// Re-exports
pub use config::{ConfigError, MinerConfig};
pub use format::{DocumentFormat, ExtractError, extract_documents, extract_text, open_decoded};
pub use matcher::PatternMatcher;
pub use miner::{BundleScan, LocalReport, Summary, process_path, scan_bundle};
