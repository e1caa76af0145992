//! Transport collaborator: fetches remote files.
//!
//! The scheduler and the metadata fetcher only see the [`Transport`] trait,
//! so tests can substitute a scripted in-memory implementation. The
//! production implementation is [`HttpTransport`], which streams responses
//! to disk and resumes partial downloads with HTTP Range requests.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::trace;

use crate::error::{MirrorError, MirrorResult};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Buffer size for writing downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server does not have the file.
    #[error("{url} not found")]
    NotFound { url: String },

    /// Timeout, connection reset, server error. Worth retrying.
    #[error("transfer of {url} failed: {reason}")]
    Transient { url: String, reason: String },

    /// The destination could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl TransportError {
    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Fetches remote files.
pub trait Transport: Send + Sync {
    /// Stream `url` to `destination`.
    ///
    /// With `range_start`, the transfer resumes at that byte offset and
    /// appends to the existing file. Servers that ignore the range cause the
    /// file to be rewritten from the start.
    ///
    /// # Returns
    ///
    /// The length of `destination` after the transfer.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        destination: &'a Path,
        range_start: Option<u64>,
    ) -> BoxFuture<'a, Result<u64, TransportError>>;

    /// Fetch `url` into memory.
    fn fetch_bytes<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, TransportError>>;
}

/// HTTP(S) transport built on reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the HTTP client cannot be built.
    pub fn new() -> MirrorResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> MirrorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aptmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MirrorError::InvalidConfig(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> TransportError {
        let reason = if e.is_timeout() {
            format!("timed out after {}s", self.timeout.as_secs())
        } else {
            e.to_string()
        };
        TransportError::Transient {
            url: url.to_string(),
            reason,
        }
    }

    async fn get(&self, url: &str, range_start: u64) -> Result<reqwest::Response, TransportError> {
        let mut request = self.client.get(url);
        if range_start > 0 {
            request = request.header(RANGE, format!("bytes={}-", range_start));
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::Transient {
                url: url.to_string(),
                reason: format!("GET request failed with status {}", status),
            });
        }
        Ok(response)
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        range_start: u64,
    ) -> Result<u64, TransportError> {
        let io_error = |source: io::Error| TransportError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut response = self.get(url, range_start).await?;

        // 200 instead of 206 means the server sent the whole file.
        let resume = range_start > 0 && response.status() == StatusCode::PARTIAL_CONTENT;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let file = if resume {
            OpenOptions::new().append(true).open(dest).await
        } else {
            File::create(dest).await
        }
        .map_err(io_error)?;

        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
        let mut written = if resume { range_start } else { 0 };

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.request_error(url, e))?
        {
            writer.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }

        writer.flush().await.map_err(io_error)?;
        trace!(url = %url, bytes = written, resumed = resume, "Transfer complete");
        Ok(written)
    }
}

impl Transport for HttpTransport {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        destination: &'a Path,
        range_start: Option<u64>,
    ) -> BoxFuture<'a, Result<u64, TransportError>> {
        Box::pin(self.stream_to_file(url, destination, range_start.unwrap_or(0)))
    }

    fn fetch_bytes<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        Box::pin(async move {
            let response = self.get(url, 0).await?;
            response.bytes().await.map_err(|e| self.request_error(url, e))
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Failure, MockTransport};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_http_transport_default_timeout() {
        let transport = HttpTransport::new().unwrap();
        assert_eq!(transport.timeout().as_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_http_transport_custom_timeout() {
        let transport = HttpTransport::with_timeout(Duration::from_secs(60)).unwrap();
        assert_eq!(transport.timeout().as_secs(), 60);
    }

    #[test]
    fn test_retryable() {
        let transient = TransportError::Transient {
            url: "u".into(),
            reason: "reset".into(),
        };
        assert!(transient.is_retryable());
        assert!(!TransportError::NotFound { url: "u".into() }.is_retryable());
    }

    #[tokio::test]
    async fn test_mock_serves_and_fails() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a/b.deb");
        let transport = MockTransport::new();
        transport.serve("http://x/b.deb", &b"payload"[..]);
        transport.fail_times("http://x/b.deb", 1, Failure::Transient);

        assert!(transport.fetch("http://x/b.deb", &dest, None).await.is_err());
        assert_eq!(transport.fetch("http://x/b.deb", &dest, None).await.unwrap(), 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        assert_eq!(transport.requests("http://x/b.deb"), 2);

        let missing = transport.fetch_bytes("http://x/missing").await;
        assert!(matches!(missing, Err(TransportError::NotFound { .. })));
    }
}
