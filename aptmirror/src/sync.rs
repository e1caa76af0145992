//! MirrorSync: one complete synchronization run.
//!
//! ```text
//! MirrorLock ──▶ MetadataFetcher ──▶ LocalState::scan ──▶ DiffPlanner
//!                                                            │
//!                     RunResult ◀── DownloadScheduler ◀──────┘
//!                                    (MirrorCommitter)
//! ```
//!
//! The lock is held for the whole run, so two syncs of the same mirror root
//! never interleave. Orphans are reported, never deleted here. Metadata the
//! planner held back is reported as failed, so the run is incomplete.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commit::MirrorLock;
use crate::commit::MirrorCommitter;
use crate::config::SyncConfig;
use crate::download::{DownloadScheduler, HttpTransport, RunResult, SyncProgressCallback, Transport};
use crate::error::{MirrorError, MirrorResult};
use crate::metadata::{MetadataFetcher, SyncManifest};
use crate::planner::{DiffPlanner, LocalState, SyncPlan};

/// Runs a sync of one repository into its mirror root.
pub struct MirrorSync {
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    progress: Option<SyncProgressCallback>,
}

impl MirrorSync {
    /// Create a sync that talks HTTP with the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate or the
    /// HTTP client cannot be built.
    pub fn new(config: SyncConfig) -> MirrorResult<Self> {
        config.validate()?;
        let transport = HttpTransport::with_timeout(config.timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a sync over an arbitrary transport.
    pub fn with_transport(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            progress: None,
        }
    }

    /// Report download progress through `callback`.
    pub fn with_progress(mut self, callback: SyncProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Local directory this sync writes to.
    pub fn mirror_root(&self) -> PathBuf {
        self.config.mirror_root()
    }

    /// Compute what a run would do without downloading or taking the lock.
    ///
    /// # Errors
    ///
    /// Returns the fatal metadata errors of [`MetadataFetcher::fetch`], or
    /// `ReadFailed` if the local mirror cannot be scanned.
    pub async fn plan(&self) -> MirrorResult<SyncPlan> {
        self.config.validate()?;
        let manifest = self.fetch_manifest().await?;
        self.plan_against_local(&manifest)
    }

    /// Run the sync to completion or until `cancel` fires.
    ///
    /// Per-file failures are part of the returned [`RunResult`]. A run that
    /// is cancelled during downloads returns `Ok` with `cancelled` set.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` if the configuration does not validate
    /// - `MirrorLocked` if another run holds the mirror
    /// - `MetadataUnavailable` / `MetadataMalformed` from metadata retrieval
    /// - `Cancelled` if cancellation arrives before downloads start
    pub async fn run(self, cancel: CancellationToken) -> MirrorResult<RunResult> {
        self.config.validate()?;

        let mirror_root = self.config.mirror_root();
        std::fs::create_dir_all(&mirror_root).map_err(|e| MirrorError::CreateDirFailed {
            path: mirror_root.clone(),
            source: e,
        })?;
        let _lock = MirrorLock::acquire(&mirror_root)?;

        info!(
            repository = %self.config.repository,
            root = %mirror_root.display(),
            distributions = ?self.config.distributions,
            "Starting sync"
        );

        let manifest = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
            manifest = self.fetch_manifest() => manifest?,
        };

        let plan = self.plan_against_local(&manifest)?;
        for orphan in &plan.orphans {
            warn!(path = %orphan, "Local file is no longer listed by the repository");
        }
        for skipped in &plan.skipped_combinations {
            warn!(scope = %skipped.scope, reason = %skipped.reason, "Combination skipped");
        }
        for held in &plan.held {
            warn!(path = %held.path, reason = %held.detail, "Keeping previous metadata");
        }
        if cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }

        let committer = Arc::new(MirrorCommitter::open(&mirror_root)?);
        let mut scheduler = DownloadScheduler::new(Arc::clone(&self.transport), committer)
            .with_concurrency(self.config.concurrency)
            .with_policy(self.config.retry_policy());
        if let Some(progress) = self.progress {
            scheduler = scheduler.with_progress(progress);
        }

        let mut result = scheduler.run(plan.actions, cancel).await;
        result.files_skipped = plan.skipped;
        result.orphans = plan.orphans;
        result.skipped_combinations = plan.skipped_combinations;
        if !plan.held.is_empty() {
            result.failures.extend(plan.held);
            result.failures.sort_by(|a, b| a.path.cmp(&b.path));
        }

        info!(
            added = result.files_added,
            replaced = result.files_replaced,
            skipped = result.files_skipped,
            failed = result.failures.len(),
            orphans = result.orphans.len(),
            cancelled = result.cancelled,
            "Sync finished"
        );
        Ok(result)
    }

    async fn fetch_manifest(&self) -> MirrorResult<SyncManifest> {
        MetadataFetcher::new(Arc::clone(&self.transport), &self.config)
            .fetch(&self.config.distributions)
            .await
    }

    fn plan_against_local(&self, manifest: &SyncManifest) -> MirrorResult<SyncPlan> {
        let local = LocalState::scan(&self.config.mirror_root())?;
        DiffPlanner::new(self.config.repository.clone())
            .with_verify_local_checksums(self.config.verify_local_checksums)
            .plan(manifest, &local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::transport::testing::Failure;
    use crate::download::FailureReason;
    use crate::metadata::fixtures::{config, RepoFixture, BASE};
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> SyncConfig {
        let mut config = config();
        config.root_path = temp.path().to_path_buf();
        config
    }

    fn sync_for(fixture: &RepoFixture, temp: &TempDir) -> MirrorSync {
        MirrorSync::with_transport(config_in(temp), Arc::new(fixture.transport.clone()))
    }

    fn small_repo() -> RepoFixture {
        let mut fixture = RepoFixture::new();
        let a = fixture.package("pool/main/a/a_1_amd64.deb", b"package a");
        let b = fixture.package("pool/main/b/b_1_amd64.deb", b"package b");
        let index = format!("{}\n{}", a, b);
        fixture.dists_file("stable", "main/binary-amd64/Packages", index.as_bytes());
        fixture.publish_release("stable");
        fixture
    }

    #[tokio::test]
    async fn test_run_mirrors_repository() {
        let temp = TempDir::new().unwrap();
        let fixture = small_repo();
        let sync = sync_for(&fixture, &temp);
        let root = sync.mirror_root();

        let result = sync.run(CancellationToken::new()).await.unwrap();

        assert!(result.is_complete());
        assert!(root.join("pool/main/a/a_1_amd64.deb").exists());
        assert!(root.join("dists/stable/main/binary-amd64/Packages").exists());
        assert!(root.join("dists/stable/Release").exists());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let fixture = small_repo();

        sync_for(&fixture, &temp)
            .run(CancellationToken::new())
            .await
            .unwrap();
        let plan = sync_for(&fixture, &temp).plan().await.unwrap();

        assert!(plan.is_empty());
        assert!(plan.skipped > 0);
    }

    #[tokio::test]
    async fn test_run_refuses_locked_mirror() {
        let temp = TempDir::new().unwrap();
        let fixture = small_repo();
        let sync = sync_for(&fixture, &temp);
        std::fs::create_dir_all(sync.mirror_root()).unwrap();
        let _held = MirrorLock::acquire(&sync.mirror_root()).unwrap();

        let err = sync.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MirrorError::MirrorLocked { .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_fetch() {
        let temp = TempDir::new().unwrap();
        let fixture = small_repo();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = sync_for(&fixture, &temp).run(cancel).await.unwrap_err();
        assert!(matches!(err, MirrorError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_package_withholds_release() {
        let temp = TempDir::new().unwrap();
        let mut fixture = RepoFixture::new();
        let listed = fixture.package("pool/main/a/a_1_amd64.deb", b"package a");
        // Listed in the index but never served.
        let ghost = listed.replace("pool/main/a/a_1_amd64.deb", "pool/main/g/ghost.deb");
        let index = format!("{}\n{}", listed, ghost);
        fixture.dists_file("stable", "main/binary-amd64/Packages", index.as_bytes());
        fixture.publish_release("stable");
        let sync = sync_for(&fixture, &temp);
        let root = sync.mirror_root();

        let result = sync.run(CancellationToken::new()).await.unwrap();

        assert_eq!(
            result.failure("pool/main/g/ghost.deb").unwrap().reason,
            FailureReason::NotFound
        );
        assert_eq!(
            result
                .failure("dists/stable/main/binary-amd64/Packages")
                .unwrap()
                .reason,
            FailureReason::DependencyFailed
        );
        assert_eq!(
            result.failure("dists/stable/Release").unwrap().reason,
            FailureReason::DependencyFailed
        );
        assert!(root.join("pool/main/a/a_1_amd64.deb").exists());
        assert!(!root.join("dists/stable/Release").exists());
    }

    #[tokio::test]
    async fn test_unserved_plain_index_does_not_block_release() {
        let temp = TempDir::new().unwrap();
        let mut fixture = RepoFixture::new();
        let index = fixture.package("pool/main/a/a_1_amd64.deb", b"package a");
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(index.as_bytes()).unwrap();
        let gz = encoder.finish().unwrap();
        fixture.dists_file("stable", "main/binary-amd64/Packages.gz", &gz);
        // Listed like on a Debian archive, but only the gzip variant exists.
        fixture.list_only("main/binary-amd64/Packages", index.as_bytes());
        fixture.publish_release("stable");
        let sync = sync_for(&fixture, &temp);
        let root = sync.mirror_root();

        let result = sync.run(CancellationToken::new()).await.unwrap();

        assert!(result.is_complete(), "{:?}", result.failures);
        assert_eq!(result.not_served, vec!["dists/stable/main/binary-amd64/Packages"]);
        assert!(root.join("dists/stable/Release").exists());
        assert!(root.join("dists/stable/main/binary-amd64/Packages.gz").exists());
        assert!(!root.join("dists/stable/main/binary-amd64/Packages").exists());
    }

    #[tokio::test]
    async fn test_release_kept_while_listed_index_unavailable() {
        let temp = TempDir::new().unwrap();
        let mut fixture = small_repo();
        sync_for(&fixture, &temp)
            .run(CancellationToken::new())
            .await
            .unwrap();
        let root = config_in(&temp).mirror_root();
        let release_path = root.join("dists/stable/Release");
        let index_path = root.join("dists/stable/main/binary-amd64/Packages");
        let old_release = fs::read(&release_path).unwrap();
        let old_index = fs::read(&index_path).unwrap();

        // Upstream moves on, but its new index cannot be retrieved.
        let index = fixture.package("pool/main/c/c_1_amd64.deb", b"package c");
        fixture.dists_file("stable", "main/binary-amd64/Packages", index.as_bytes());
        fixture.publish_release("stable");
        fixture.transport.fail_times(
            &format!("{}/dists/stable/main/binary-amd64/Packages", BASE),
            100,
            Failure::Transient,
        );
        let config = config_in(&temp).with_max_attempts(1);
        let result = MirrorSync::with_transport(config, Arc::new(fixture.transport.clone()))
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.skipped_combinations.len(), 1);
        assert_eq!(
            result.failure("dists/stable/Release").unwrap().reason,
            FailureReason::DependencyFailed
        );
        assert!(!result.is_complete());
        assert_eq!(fs::read(&release_path).unwrap(), old_release);
        assert_eq!(fs::read(&index_path).unwrap(), old_index);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let fixture = small_repo();
        let config = config_in(&temp).with_concurrency(0);
        let sync = MirrorSync::with_transport(config, Arc::new(fixture.transport.clone()));

        let err = sync.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MirrorError::InvalidConfig(_)));
    }
}
