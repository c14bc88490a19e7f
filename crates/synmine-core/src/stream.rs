//! HTTP fetching with read timeout.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a sync interface for use from rayon workers.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};
use std::task::Context;
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::ProgressBar;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::FetchError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Copy buffer for downloads (256KB)
const DOWNLOAD_BUF_SIZE: usize = 256 * 1024;

/// Tunable HTTP settings, set once by the CLI before any request.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// No data for this long during a body read = stall
    pub read_timeout: Duration,
    /// Upper bound for small whole-body requests (directory listings)
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install the process-wide HTTP config. Later calls are ignored.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, ignoring override");
    }
}

/// Current HTTP config (defaults if never set)
pub fn http_config() -> &'static HttpConfig {
    HTTP_CONFIG.get_or_init(HttpConfig::default)
}

/// Error types for stream operations
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Transient failures are worth another attempt; a 404 never is.
    pub fn is_retryable(&self) -> bool {
        match self {
            // No status = connection-level failure
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(s), ..
            } => matches!(s, 408 | 429) || *s >= 500,
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(8)
        .user_agent(concat!("synmine/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Shared byte counter for progress tracking
pub type ByteCounter = Arc<AtomicU64>;

/// GET a small resource and return its body as text.
///
/// The whole request is bounded by `request_timeout`.
pub fn fetch_text(url: &str) -> Result<String, StreamError> {
    let timeout = http_config().request_timeout;
    SHARED_RUNTIME.handle().block_on(async {
        let request = async {
            SHARED_CLIENT
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| StreamError::from_reqwest(&e))?
                .text()
                .await
                .map_err(|e| StreamError::from_reqwest(&e))
        };
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("request timed out after {}s", timeout.as_secs()),
            ))),
        }
    })
}

/// HTTP GET → sync reader with byte counter
///
/// Returns (reader, byte_counter, total_bytes)
fn open_reader(
    url: &str,
) -> Result<(CountingReader<TimeoutReader>, ByteCounter, Option<u64>), StreamError> {
    let url = url.to_string();

    let (reader, total_bytes) = SHARED_RUNTIME.handle().block_on(async {
        let response = SHARED_CLIENT
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StreamError::from_reqwest(&e))?;

        let total_bytes = response.content_length();

        // Convert response body stream to AsyncRead
        let stream = response.bytes_stream();
        let async_reader = tokio_util::io::StreamReader::new(
            stream.map(|result| result.map_err(io::Error::other)),
        );

        Ok::<_, StreamError>((TimeoutReader::new(Box::pin(async_reader)), total_bytes))
    })?;

    let counter = Arc::new(AtomicU64::new(0));
    let counting_reader = CountingReader {
        inner: reader,
        count: counter.clone(),
    };

    Ok((counting_reader, counter, total_bytes))
}

/// Download `url` to `dest`, going through `dest.tmp` so a partial body never
/// looks like a finished file.
///
/// Returns the number of bytes written.
pub fn download_to_file(url: &str, dest: &Path, pb: &ProgressBar) -> Result<u64, FetchError> {
    let (mut reader, counter, total_bytes) = open_reader(url).map_err(FetchError::Stream)?;

    if let Some(total) = total_bytes {
        crate::progress::upgrade_to_bar(pb, total);
    }
    pb.set_message("downloading...");

    let tmp = crate::sink::tmp_path(dest);
    let file = File::create(&tmp).map_err(FetchError::Io)?;
    let mut writer = BufWriter::new(file);
    let mut buf = vec![0u8; DOWNLOAD_BUF_SIZE];

    let copied = (|| -> Result<(), FetchError> {
        loop {
            // Read errors come from the network side
            let n = reader
                .read(&mut buf)
                .map_err(|e| FetchError::Stream(StreamError::Io(e)))?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).map_err(FetchError::Io)?;
            pb.set_position(counter.load(Ordering::Relaxed));
        }
        writer.flush().map_err(FetchError::Io)
    })();

    if let Err(e) = copied {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, dest).map_err(FetchError::Io)?;
    Ok(counter.load(Ordering::Relaxed))
}

/// Reader wrapper that tracks bytes read
pub struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Async-to-sync bridge with read timeout.
///
/// Each read operation has a timeout - if no data arrives within
/// `read_timeout`, returns TimedOut error (which triggers retry).
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
    timeout: Duration,
}

impl TimeoutReader {
    fn new(inner: Pin<Box<dyn AsyncRead + Send + Sync>>) -> Self {
        Self {
            inner,
            timeout: http_config().read_timeout,
        }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(timeout, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read timeout ({}s with no data)", timeout.as_secs()),
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> StreamError {
        StreamError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn http_404_not_retryable() {
        assert!(!http_err(404).is_retryable());
    }

    #[test]
    fn http_403_not_retryable() {
        assert!(!http_err(403).is_retryable());
    }

    #[test]
    fn http_503_retryable() {
        assert!(http_err(503).is_retryable());
    }

    #[test]
    fn http_500_retryable() {
        assert!(http_err(500).is_retryable());
    }

    #[test]
    fn http_429_and_408_retryable() {
        assert!(http_err(429).is_retryable());
        assert!(http_err(408).is_retryable());
    }

    #[test]
    fn io_timeout_retryable() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
        assert!(err.is_retryable());
    }

    #[test]
    fn io_storage_full_not_retryable() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_none_status_retryable() {
        // Network error without status code should be retryable
        let err = StreamError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn display_http_with_status() {
        let err = http_err(404);
        assert_eq!(format!("{err}"), "HTTP 404: test");
    }

    #[test]
    fn display_http_without_status() {
        let err = StreamError::Http {
            status: None,
            message: "timeout".to_string(),
        };
        assert_eq!(format!("{err}"), "HTTP error: timeout");
    }

    mod http {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn mock_server() -> MockServer {
            SHARED_RUNTIME.block_on(MockServer::start())
        }

        fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
            SHARED_RUNTIME.block_on(
                Mock::given(method("GET"))
                    .and(path(route))
                    .respond_with(response)
                    .mount(server),
            );
        }

        #[test]
        fn download_writes_body_and_removes_tmp() {
            let server = mock_server();
            mount(
                &server,
                "/a.xml.gz",
                ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()),
            );
            let dir = tempfile::TempDir::new().unwrap();
            let dest = dir.path().join("a.xml.gz");

            let url = format!("{}/a.xml.gz", server.uri());
            let bytes = download_to_file(&url, &dest, &ProgressBar::hidden()).unwrap();

            assert_eq!(bytes, 7);
            assert_eq!(fs::read(&dest).unwrap(), b"payload");
            assert!(!dir.path().join("a.xml.gz.tmp").exists());
            assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        }

        #[test]
        fn download_keeps_sibling_with_shared_stem() {
            let server = mock_server();
            mount(
                &server,
                "/b.xml.gz",
                ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()),
            );
            let dir = tempfile::TempDir::new().unwrap();
            // Would collide with a stem-based tmp name for b.xml.gz
            let sibling = dir.path().join("b.xml.tmp");
            fs::write(&sibling, b"other").unwrap();

            let url = format!("{}/b.xml.gz", server.uri());
            download_to_file(&url, &dir.path().join("b.xml.gz"), &ProgressBar::hidden()).unwrap();

            assert_eq!(fs::read(&sibling).unwrap(), b"other");
            assert_eq!(fs::read(dir.path().join("b.xml.gz")).unwrap(), b"new");
        }

        #[test]
        fn download_404_is_permanent() {
            let server = mock_server();
            mount(&server, "/missing.xml.gz", ResponseTemplate::new(404));
            let dir = tempfile::TempDir::new().unwrap();
            let dest = dir.path().join("missing.xml.gz");

            let url = format!("{}/missing.xml.gz", server.uri());
            let err = download_to_file(&url, &dest, &ProgressBar::hidden()).unwrap_err();

            assert_eq!(err.status(), Some(404));
            assert!(!err.is_retryable());
            assert!(!dest.exists());
        }

        #[test]
        fn fetch_text_returns_body() {
            let server = mock_server();
            mount(
                &server,
                "/listing/",
                ResponseTemplate::new(200).set_body_string("<html></html>"),
            );
            let body = fetch_text(&format!("{}/listing/", server.uri())).unwrap();
            assert_eq!(body, "<html></html>");
        }

        #[test]
        fn fetch_text_503_is_transient() {
            let server = mock_server();
            mount(&server, "/busy/", ResponseTemplate::new(503));
            let err = fetch_text(&format!("{}/busy/", server.uri())).unwrap_err();
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }
}
