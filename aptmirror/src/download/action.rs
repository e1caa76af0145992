//! Download actions and their per-action state machine.
//!
//! Every file the planner decides to fetch becomes a [`DownloadAction`].
//! The scheduler drives each action through [`ActionState`] using the pure
//! [`next_state`] decision function; no retry decision is made anywhere
//! else.
//!
//! ```text
//! Pending ──▶ InFlight ──▶ Verifying ──▶ Committed
//!                ▲  │           │
//!                │  ▼           ▼
//!              RetryWait ◀──────┘
//!
//! any non-terminal state ──▶ PermanentlyFailed | Cancelled
//! ```

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::metadata::Checksum;

/// Whether the file is new or replaces an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Replace,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// What the file is, for commit ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRole {
    /// A package file, listed by the given index paths.
    Package { referenced_by: Vec<String> },
    /// An index or auxiliary metadata file below `dists/<distribution>/`.
    Index { distribution: String },
    /// `Release`, `InRelease` or `Release.gpg`.
    Release { distribution: String },
}

impl ActionRole {
    pub fn is_metadata(&self) -> bool {
        !matches!(self, Self::Package { .. })
    }
}

/// One file to transfer into the mirror.
#[derive(Debug, Clone)]
pub struct DownloadAction {
    /// Path relative to the mirror root.
    pub path: String,
    /// Remote URL.
    pub url: String,
    pub expected_size: u64,
    /// Strongest checksum known for the file.
    pub expected_checksum: Checksum,
    pub kind: ChangeKind,
    pub role: ActionRole,
    /// Bytes already fetched while building the manifest, if any.
    pub content: Option<Bytes>,
    /// A metadata variant the server may not publish. Archives list
    /// uncompressed indexes they only serve compressed; a 404 for such a
    /// file is not a failure.
    pub optional: bool,
}

impl DownloadAction {
    pub fn new(
        path: impl Into<String>,
        url: impl Into<String>,
        expected_size: u64,
        expected_checksum: Checksum,
    ) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            expected_size,
            expected_checksum,
            kind: ChangeKind::Add,
            role: ActionRole::Package {
                referenced_by: Vec::new(),
            },
            content: None,
            optional: false,
        }
    }

    pub fn with_kind(mut self, kind: ChangeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_role(mut self, role: ActionRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_content(mut self, content: Bytes) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}

/// Lifecycle state of a download action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    /// Queued, not yet started.
    Pending,
    /// Transfer in progress.
    InFlight,
    /// Transfer finished, checking size and checksum.
    Verifying,
    /// Waiting out a backoff delay before the next attempt.
    RetryWait,
    /// Verified and renamed into the mirror.
    Committed,
    /// Given up on; nothing was published at its path.
    PermanentlyFailed,
    /// Dropped because the run was cancelled.
    Cancelled,
}

impl ActionState {
    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Committed | Self::PermanentlyFailed | Self::Cancelled
        )
    }
}

/// Event fed into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// A worker picked the action up.
    Started,
    /// The transfer wrote all bytes to the staging file.
    TransferComplete,
    /// Timeout, connection reset or server error.
    TransferFailed,
    /// The server does not have the file.
    NotFound,
    /// The staging file could not be written.
    StagingFailed,
    /// Size or checksum mismatch.
    VerificationFailed,
    /// The verified file is in place.
    Committed,
    /// The rename into the mirror failed.
    CommitFailed,
    /// The backoff delay has passed.
    BackoffElapsed,
    /// The run was cancelled.
    Cancelled,
}

/// Decide the next state of an action.
///
/// # Arguments
///
/// * `current` - State the action is in
/// * `outcome` - What just happened
/// * `attempt` - Attempts started so far (1-based once in flight)
/// * `max_attempts` - Attempt cap
///
/// # Returns
///
/// The new state. Terminal states never change, and an outcome that makes
/// no sense for the current state leaves it unchanged.
pub fn next_state(
    current: ActionState,
    outcome: AttemptOutcome,
    attempt: u32,
    max_attempts: u32,
) -> ActionState {
    use ActionState as S;
    use AttemptOutcome as O;

    if current.is_terminal() {
        return current;
    }

    let retry_or_fail = if attempt < max_attempts {
        S::RetryWait
    } else {
        S::PermanentlyFailed
    };

    match (current, outcome) {
        (_, O::Cancelled) => S::Cancelled,
        (S::Pending, O::Started) => S::InFlight,
        (S::InFlight, O::TransferComplete) => S::Verifying,
        (S::InFlight, O::TransferFailed) => retry_or_fail,
        (S::InFlight, O::NotFound) | (S::InFlight, O::StagingFailed) => S::PermanentlyFailed,
        (S::Verifying, O::VerificationFailed) => retry_or_fail,
        (S::Verifying, O::Committed) => S::Committed,
        (S::Verifying, O::CommitFailed) => S::PermanentlyFailed,
        (S::RetryWait, O::BackoffElapsed) => S::InFlight,
        (state, _) => state,
    }
}
