//! Error types for mirror synchronization.
//!
//! Only manifest-level problems surface as `Err` from a sync run. Failures of
//! individual files are recorded in the run result (see
//! [`crate::download::RunResult`]) and never abort the run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Errors that can occur while mirroring a repository.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// A required document could not be retrieved.
    ///
    /// Fatal for the document's scope only (e.g. one component/architecture).
    #[error("metadata unavailable at {url}: {reason}")]
    MetadataUnavailable { url: String, reason: String },

    /// A document could not be parsed or uses an unsupported checksum format.
    ///
    /// Fatal for the whole run since the manifest cannot be trusted.
    #[error("malformed metadata in {path}: {reason}")]
    MetadataMalformed { path: String, reason: String },

    /// Timeout, connection reset or server error. Retried.
    #[error("transient transport failure for {url}: {reason}")]
    TransportTransient { url: String, reason: String },

    /// Downloaded content did not match the expected size or checksum.
    #[error("integrity mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A verified file could not be renamed into the mirror.
    #[error("failed to commit {}: {source}", path.display())]
    CommitFailure { path: PathBuf, source: io::Error },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Another sync holds the lock on this mirror.
    #[error("mirror at {} is locked by another process", path.display())]
    MirrorLocked { path: PathBuf },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled before it produced a result.
    #[error("operation cancelled")]
    Cancelled,
}

impl MirrorError {
    /// Create a malformed metadata error.
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetadataMalformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable metadata error.
    pub fn unavailable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetadataUnavailable {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MirrorError::malformed("dists/stable/Release", "no checksum section");
        assert_eq!(
            err.to_string(),
            "malformed metadata in dists/stable/Release: no checksum section"
        );
    }

    #[test]
    fn test_integrity_mismatch_display() {
        let err = MirrorError::IntegrityMismatch {
            path: "pool/main/a/a.deb".to_string(),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        assert!(err.to_string().contains("integrity mismatch"));
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("def456"));
    }
}
