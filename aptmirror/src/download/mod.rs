//! Download pipeline: transfers, retries, verification and commit ordering.
//!
//! This module provides:
//! - The transport collaborator and its HTTP implementation (`transport`)
//! - Retry policy with exponential backoff (`policy`)
//! - Download actions and the per-action state machine (`action`)
//! - Commit ordering between packages, indexes and Release files (`gate`)
//! - Progress counters (`progress`)
//! - Run results (`report`)
//! - The bounded worker pool (`scheduler`)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use aptmirror::commit::MirrorCommitter;
//! use aptmirror::download::{DownloadScheduler, HttpTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! let committer = Arc::new(MirrorCommitter::open("/srv/mirror/deb.debian.org/debian")?);
//! let scheduler = DownloadScheduler::new(Arc::new(HttpTransport::new()?), committer)
//!     .with_concurrency(5);
//!
//! let result = scheduler.run(plan.actions, CancellationToken::new()).await;
//! for failure in &result.failures {
//!     eprintln!("{}: {}", failure.path, failure.reason);
//! }
//! ```

pub mod action;
mod gate;
mod policy;
mod progress;
mod report;
mod scheduler;
pub mod transport;

pub use action::{next_state, ActionRole, ActionState, AttemptOutcome, ChangeKind, DownloadAction};
pub use gate::{CommitGate, GateUpdate};
pub use policy::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
pub use progress::{ProgressCounters, SyncProgressCallback};
pub use report::{CommittedFile, FailureReason, FailureRecord, ResultAccumulator, RunResult};
pub use scheduler::DownloadScheduler;
pub use transport::{BoxFuture, HttpTransport, Transport, TransportError, DEFAULT_TIMEOUT_SECS};
