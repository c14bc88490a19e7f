//! Error type for fetching one remote unit to local disk

use crate::stream::StreamError;

/// Error from downloading a single unit.
///
/// Wraps either a network/HTTP error ([`StreamError`]) or a local I/O error
/// while writing the downloaded bytes.
#[derive(Debug)]
pub enum FetchError {
    Stream(StreamError),
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Stream(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stream(e) => e.is_retryable(),
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
        }
    }

    /// HTTP status of the failed request, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Stream(StreamError::Http { status, .. }) => *status,
            _ => None,
        }
    }
}
