//! Synmine Core - Common infrastructure for the identifier mining pipeline
//!
//! This crate provides the reusable pieces shared by the local and remote
//! pipelines: HTTP fetching with retries, result sinks, progress reporting
//! and logging.

pub mod error;
pub mod finding;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod stream;
pub mod work_queue;

// Re-exports for convenience
pub use error::FetchError;
pub use finding::{Finding, FindingRow};
pub use logging::{IndicatifLogger, default_filter, init_logging};
pub use progress::{ProgressContext, SharedProgress};
pub use retry::{RetryPolicy, Retryable};
pub use shutdown::{install_signal_handlers, is_shutdown_requested};
pub use sink::{ResultSink, cleanup_tmp_files, read_rows, write_csv, write_json};
pub use stream::{
    ByteCounter, HttpConfig, SHARED_RUNTIME, StreamError, download_to_file, fetch_text,
    http_client, http_config, set_http_config,
};
pub use work_queue::WorkQueue;
