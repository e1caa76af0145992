//! aptmirror - incremental mirroring of APT package repositories
//!
//! A sync run moves through four stages:
//!
//! ```text
//! MetadataFetcher ──▶ DiffPlanner ──▶ DownloadScheduler ──▶ MirrorCommitter
//!  Release + indexes    add/replace     bounded workers,      atomic rename
//!  → SyncManifest       → SyncPlan      retry, verify         into the mirror
//! ```
//!
//! Files are only ever published after their checksum matched, and index
//! documents only after every package file they list. An interrupted run
//! leaves the mirror consistent and the next run picks up where it stopped.
//!
//! # Example
//!
//! ```ignore
//! use aptmirror::config::SyncConfig;
//! use aptmirror::repo::{RepoCoordinates, Scheme};
//! use aptmirror::sync::MirrorSync;
//! use tokio_util::sync::CancellationToken;
//!
//! let repo = RepoCoordinates::from_base_url(Scheme::Https, "deb.debian.org/debian")?;
//! let config = SyncConfig::new(repo, "/srv/mirror")
//!     .with_distribution("bookworm")
//!     .with_components(["main"])
//!     .with_architectures(["amd64"]);
//!
//! let result = MirrorSync::new(config)?.run(CancellationToken::new()).await?;
//! println!("{} files added", result.files_added);
//! ```

pub mod commit;
pub mod config;
pub mod download;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod planner;
pub mod prune;
pub mod repo;
pub mod sync;

pub use error::{MirrorError, MirrorResult};
pub use sync::MirrorSync;
