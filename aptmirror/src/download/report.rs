//! Run results.
//!
//! Workers append to a [`ResultAccumulator`] owned by the scheduler; the
//! finished [`RunResult`] is returned to the caller.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

use super::action::ChangeKind;
use crate::metadata::SkippedCombination;

/// Why a file was not published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Timeouts, resets or server errors on every attempt.
    TransportTransient,
    /// Size or checksum mismatch on the final attempt.
    IntegrityMismatch,
    /// The server does not have the file.
    NotFound,
    /// The verified file could not be renamed into place.
    CommitFailure,
    /// A file this one depends on was not published.
    DependencyFailed,
    /// The staging file could not be written.
    StagingFailure,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TransportTransient => "TransportTransient",
            Self::IntegrityMismatch => "IntegrityMismatch",
            Self::NotFound => "NotFound",
            Self::CommitFailure => "CommitFailure",
            Self::DependencyFailed => "DependencyFailed",
            Self::StagingFailure => "StagingFailure",
        };
        f.write_str(name)
    }
}

/// A file that was given up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub path: String,
    pub reason: FailureReason,
    pub detail: String,
    pub attempts: u32,
}

/// A file published by this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedFile {
    pub path: String,
    pub kind: ChangeKind,
    pub attempts: u32,
    pub bytes: u64,
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub files_added: usize,
    pub files_replaced: usize,
    /// Manifest files already up to date.
    pub files_skipped: usize,
    pub bytes_downloaded: u64,
    pub committed: Vec<CommittedFile>,
    pub failures: Vec<FailureRecord>,
    /// Actions dropped because the run was cancelled.
    pub dropped: usize,
    pub skipped_combinations: Vec<SkippedCombination>,
    /// Local files no longer referenced by the repository.
    pub orphans: Vec<String>,
    /// Listed metadata variants the server does not publish.
    pub not_served: Vec<String>,
    pub cancelled: bool,
}

impl RunResult {
    /// Returns true if any file was permanently failed or withheld.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns true if the mirror is fully up to date.
    pub fn is_complete(&self) -> bool {
        !self.has_failures() && !self.cancelled && self.dropped == 0
    }

    pub fn failure(&self, path: &str) -> Option<&FailureRecord> {
        self.failures.iter().find(|f| f.path == path)
    }

    pub fn committed_file(&self, path: &str) -> Option<&CommittedFile> {
        self.committed.iter().find(|c| c.path == path)
    }
}

/// Concurrent collector for a [`RunResult`].
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    inner: Mutex<RunResult>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_committed(&self, path: &str, kind: ChangeKind, attempts: u32, bytes: u64) {
        let mut result = self.inner.lock();
        match kind {
            ChangeKind::Add => result.files_added += 1,
            ChangeKind::Replace => result.files_replaced += 1,
        }
        result.bytes_downloaded += bytes;
        result.committed.push(CommittedFile {
            path: path.to_string(),
            kind,
            attempts,
            bytes,
        });
    }

    pub fn record_failure(
        &self,
        path: &str,
        reason: FailureReason,
        detail: impl Into<String>,
        attempts: u32,
    ) {
        self.inner.lock().failures.push(FailureRecord {
            path: path.to_string(),
            reason,
            detail: detail.into(),
            attempts,
        });
    }

    pub fn record_not_served(&self, path: &str) {
        self.inner.lock().not_served.push(path.to_string());
    }

    pub fn record_dropped(&self, count: usize) {
        self.inner.lock().dropped += count;
    }

    pub fn mark_cancelled(&self) {
        self.inner.lock().cancelled = true;
    }

    /// Take the collected result. Entries are sorted by path.
    pub fn finish(&self) -> RunResult {
        let mut result = std::mem::take(&mut *self.inner.lock());
        result.committed.sort_by(|a, b| a.path.cmp(&b.path));
        result.failures.sort_by(|a, b| a.path.cmp(&b.path));
        result.not_served.sort();
        result
    }
}
