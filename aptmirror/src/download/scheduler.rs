//! DownloadScheduler: bounded worker pool for download actions.
//!
//! A fixed number of workers pull action ids from a shared ready queue. Each
//! worker takes one action through fetch, verify and commit before asking for
//! the next one, so at most `concurrency` actions are ever in flight and a
//! slow file only occupies one worker.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │ WorkQueue (Mutex)            │
//!                 │  ready ◀── CommitGate        │
//!                 └──────┬───────────────▲───────┘
//!            pop         │               │ complete(id)
//!          ┌─────────────┼───────────────┼─────┐
//!          ▼             ▼               │     ▼
//!      worker 0      worker 1   ...   worker N-1
//!          │
//!          ├── Transport::fetch ──▶ staging/<path>.part
//!          ├── verify_file (blocking pool)
//!          └── MirrorCommitter::commit ──▶ <mirror root>/<path>
//! ```
//!
//! Index documents only enter the ready queue once every package file they
//! list has committed; see [`CommitGate`].
//!
//! # Cancellation
//!
//! Cancelling the token aborts transfers and backoff waits. A file that is
//! already being verified finishes verification and is committed if it
//! passed. Queued actions are dropped and counted in `RunResult::dropped`.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::action::{next_state, ActionState, AttemptOutcome, DownloadAction};
use super::gate::CommitGate;
use super::policy::RetryPolicy;
use super::progress::{ProgressCounters, SyncProgressCallback};
use super::report::{FailureReason, ResultAccumulator, RunResult};
use super::transport::{Transport, TransportError};
use crate::commit::MirrorCommitter;
use crate::config::DEFAULT_CONCURRENCY;
use crate::error::MirrorError;
use crate::metadata::verify_file;

/// Executes download actions with bounded concurrency.
pub struct DownloadScheduler {
    transport: Arc<dyn Transport>,
    committer: Arc<MirrorCommitter>,
    concurrency: usize,
    policy: RetryPolicy,
    progress: Option<Arc<SyncProgressCallback>>,
}

impl DownloadScheduler {
    /// Create a scheduler with the default concurrency and retry policy.
    pub fn new(transport: Arc<dyn Transport>, committer: Arc<MirrorCommitter>) -> Self {
        Self {
            transport,
            committer,
            concurrency: DEFAULT_CONCURRENCY,
            policy: RetryPolicy::default(),
            progress: None,
        }
    }

    /// Set the number of workers. Values below 1 are treated as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Report progress after every finished action.
    pub fn with_progress(mut self, callback: SyncProgressCallback) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every action to a terminal state.
    ///
    /// Per-file failures are recorded in the result, never returned as
    /// errors.
    ///
    /// # Arguments
    ///
    /// * `actions` - Actions in planner order
    /// * `cancel` - Run-level cancellation signal
    pub async fn run(&self, actions: Vec<DownloadAction>, cancel: CancellationToken) -> RunResult {
        if actions.is_empty() {
            return RunResult::default();
        }

        let total_bytes: u64 = actions.iter().map(|a| a.expected_size).sum();
        let gate = CommitGate::new(&actions);
        let queue = WorkQueue {
            ready: gate.initially_ready().into(),
            unfinished: actions.len(),
            gate,
        };
        let workers = self.concurrency.min(actions.len());

        info!(
            actions = actions.len(),
            bytes = total_bytes,
            workers,
            "Starting downloads"
        );

        let shared = Arc::new(Shared {
            counters: ProgressCounters::new(actions.len(), total_bytes),
            actions,
            queue: Mutex::new(queue),
            wake: Notify::new(),
            results: ResultAccumulator::new(),
            transport: Arc::clone(&self.transport),
            committer: Arc::clone(&self.committer),
            policy: self.policy.clone(),
            progress: self.progress.clone(),
            cancel,
        });

        let handles: Vec<_> = (0..workers)
            .map(|worker| tokio::spawn(Arc::clone(&shared).worker(worker)))
            .collect();
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Download worker failed");
            }
        }

        let dropped = shared.queue.lock().unfinished;
        if dropped > 0 {
            shared.results.record_dropped(dropped);
        }
        if shared.cancel.is_cancelled() {
            shared.results.mark_cancelled();
        }

        let result = shared.results.finish();
        info!(
            added = result.files_added,
            replaced = result.files_replaced,
            failed = result.failures.len(),
            dropped = result.dropped,
            bytes = result.bytes_downloaded,
            "Downloads finished"
        );
        result
    }
}

/// Queue state shared by all workers.
struct WorkQueue {
    ready: VecDeque<usize>,
    gate: CommitGate,
    /// Actions not yet in a terminal state, including those waiting on the gate.
    unfinished: usize,
}

struct Shared {
    actions: Vec<DownloadAction>,
    queue: Mutex<WorkQueue>,
    wake: Notify,
    results: ResultAccumulator,
    counters: ProgressCounters,
    transport: Arc<dyn Transport>,
    committer: Arc<MirrorCommitter>,
    policy: RetryPolicy,
    progress: Option<Arc<SyncProgressCallback>>,
    cancel: CancellationToken,
}

/// Why the last attempt of an action failed.
struct LastFailure {
    reason: FailureReason,
    detail: String,
}

enum Next {
    Action(usize),
    Wait,
    Exit,
}

impl Shared {
    async fn worker(self: Arc<Self>, worker: usize) {
        trace!(worker, "Worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Register for wakeups before looking at the queue so a
            // completion between the check and the wait is not missed.
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = {
                let mut queue = self.queue.lock();
                match queue.ready.pop_front() {
                    Some(id) => Next::Action(id),
                    None if queue.unfinished == 0 => Next::Exit,
                    None => Next::Wait,
                }
            };

            match next {
                Next::Action(id) => self.process(id).await,
                Next::Exit => break,
                Next::Wait => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = notified => {}
                    }
                }
            }
        }

        trace!(worker, "Worker stopped");
    }

    /// Drive one action through the state machine.
    async fn process(&self, id: usize) {
        let action = &self.actions[id];
        let temp = self.committer.staging().temp_path(&action.path);
        let max_attempts = self.policy.max_attempts();

        let mut state = ActionState::Pending;
        let mut attempts = 0;
        let mut last_failure = None;

        while !state.is_terminal() {
            let outcome = match state {
                ActionState::Pending => {
                    if self.cancel.is_cancelled() {
                        AttemptOutcome::Cancelled
                    } else {
                        attempts = 1;
                        AttemptOutcome::Started
                    }
                }
                ActionState::InFlight => {
                    self.transfer(action, &temp, attempts, &mut last_failure)
                        .await
                }
                ActionState::Verifying => self.verify_and_commit(action, &temp, &mut last_failure).await,
                ActionState::RetryWait => {
                    let delay = self.policy.delay_for_attempt(attempts).unwrap_or_default();
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => AttemptOutcome::Cancelled,
                        _ = tokio::time::sleep(delay) => {
                            attempts += 1;
                            AttemptOutcome::BackoffElapsed
                        }
                    }
                }
                ActionState::Committed
                | ActionState::PermanentlyFailed
                | ActionState::Cancelled => break,
            };

            let next = next_state(state, outcome, attempts, max_attempts);
            trace!(
                path = %action.path,
                from = ?state,
                to = ?next,
                outcome = ?outcome,
                attempt = attempts,
                "Action transition"
            );
            if next == ActionState::RetryWait {
                if let Some(failure) = &last_failure {
                    warn!(
                        path = %action.path,
                        attempt = attempts,
                        max_attempts,
                        error = %failure.detail,
                        "Download attempt failed, retrying"
                    );
                }
            }
            state = next;
        }

        match state {
            ActionState::Committed => {
                debug!(path = %action.path, kind = %action.kind, attempts, "File committed");
                self.results
                    .record_committed(&action.path, action.kind, attempts, action.expected_size);
                self.finish(id, Some(true));
            }
            ActionState::PermanentlyFailed => {
                self.committer.discard(&temp);
                let failure = last_failure.unwrap_or(LastFailure {
                    reason: FailureReason::TransportTransient,
                    detail: "gave up".to_string(),
                });
                if action.optional && failure.reason == FailureReason::NotFound {
                    debug!(path = %action.path, "Listed but not served, leaving it out");
                    self.results.record_not_served(&action.path);
                    // Nothing to publish, so nothing for dependents to wait for.
                    self.finish(id, Some(true));
                    return;
                }
                error!(
                    path = %action.path,
                    reason = %failure.reason,
                    attempts,
                    error = %failure.detail,
                    "Download permanently failed"
                );
                self.results
                    .record_failure(&action.path, failure.reason, failure.detail, attempts);
                self.finish(id, Some(false));
            }
            _ => {
                self.committer.discard(&temp);
                debug!(path = %action.path, "Action cancelled");
                self.finish(id, None);
            }
        }
    }

    /// One transfer attempt into the staging file.
    async fn transfer(
        &self,
        action: &DownloadAction,
        temp: &Path,
        attempt: u32,
        last_failure: &mut Option<LastFailure>,
    ) -> AttemptOutcome {
        if let Some(content) = &action.content {
            return match write_content(temp, content).await {
                Ok(()) => AttemptOutcome::TransferComplete,
                Err(e) => {
                    *last_failure = Some(LastFailure {
                        reason: FailureReason::StagingFailure,
                        detail: e.to_string(),
                    });
                    AttemptOutcome::StagingFailed
                }
            };
        }

        let range_start = if attempt > 1 {
            resume_offset(temp, action.expected_size).await
        } else {
            None
        };
        if let Some(offset) = range_start {
            debug!(path = %action.path, offset, "Resuming partial download");
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return AttemptOutcome::Cancelled,
            result = self.transport.fetch(&action.url, temp, range_start) => result,
        };

        match result {
            Ok(bytes) => {
                trace!(path = %action.path, bytes, "Transfer complete");
                AttemptOutcome::TransferComplete
            }
            Err(e) => {
                let (reason, outcome) = match &e {
                    TransportError::NotFound { .. } => {
                        (FailureReason::NotFound, AttemptOutcome::NotFound)
                    }
                    TransportError::Io { .. } => {
                        (FailureReason::StagingFailure, AttemptOutcome::StagingFailed)
                    }
                    TransportError::Transient { .. } => (
                        FailureReason::TransportTransient,
                        AttemptOutcome::TransferFailed,
                    ),
                };
                *last_failure = Some(LastFailure {
                    reason,
                    detail: e.to_string(),
                });
                outcome
            }
        }
    }

    /// Verify the staging file and publish it.
    ///
    /// Runs on the blocking pool and is not interrupted by cancellation.
    async fn verify_and_commit(
        &self,
        action: &DownloadAction,
        temp: &Path,
        last_failure: &mut Option<LastFailure>,
    ) -> AttemptOutcome {
        let committer = Arc::clone(&self.committer);
        let temp_path = temp.to_path_buf();
        let path = action.path.clone();
        let size = action.expected_size;
        let checksum = action.expected_checksum.clone();

        let result = tokio::task::spawn_blocking(move || {
            verify_file(&temp_path, &path, size, &checksum)?;
            committer.commit(&temp_path, &path).map(|_| ())
        })
        .await;

        let (reason, detail, outcome) = match result {
            Ok(Ok(())) => return AttemptOutcome::Committed,
            Ok(Err(e @ MirrorError::CommitFailure { .. })) => (
                FailureReason::CommitFailure,
                e.to_string(),
                AttemptOutcome::CommitFailed,
            ),
            Ok(Err(e)) => {
                // Start the next attempt from scratch.
                self.committer.discard(temp);
                (
                    FailureReason::IntegrityMismatch,
                    e.to_string(),
                    AttemptOutcome::VerificationFailed,
                )
            }
            Err(e) => {
                self.committer.discard(temp);
                (
                    FailureReason::IntegrityMismatch,
                    format!("verification task failed: {}", e),
                    AttemptOutcome::VerificationFailed,
                )
            }
        };

        *last_failure = Some(LastFailure { reason, detail });
        outcome
    }

    /// Record a terminal action and release or withhold its dependents.
    ///
    /// `committed` is `None` for a cancelled action. It stays unfinished,
    /// as do its dependents, and all of them are counted as dropped.
    fn finish(&self, id: usize, committed: Option<bool>) {
        let action = &self.actions[id];

        let update = committed.map(|committed| {
            let mut queue = self.queue.lock();
            let update = queue.gate.complete(id, committed);
            queue.unfinished = queue
                .unfinished
                .saturating_sub(1 + update.withheld.len());
            queue.ready.extend(update.ready.iter().copied());
            update
        });

        if let Some(update) = update {
            self.counters.mark_finished(action.expected_size);
            for withheld in update.withheld {
                let dependent = &self.actions[withheld];
                warn!(
                    path = %dependent.path,
                    because = %action.path,
                    "Withholding file whose dependency was not published"
                );
                self.results.record_failure(
                    &dependent.path,
                    FailureReason::DependencyFailed,
                    format!("{} was not published", action.path),
                    0,
                );
                self.counters.mark_finished(dependent.expected_size);
            }
        }

        if let Some(callback) = &self.progress {
            self.counters.report(callback);
        }

        self.wake.notify_waiters();
    }
}

/// Write bytes fetched while building the manifest to the staging file.
async fn write_content(temp: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = temp.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(temp, content).await
}

/// Length of a partial staging file worth resuming from.
async fn resume_offset(temp: &Path, expected_size: u64) -> Option<u64> {
    let len = tokio::fs::metadata(temp).await.ok()?.len();
    (len > 0 && len < expected_size).then_some(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::action::{ActionRole, ChangeKind};
    use crate::download::transport::testing::{Failure, MockTransport};
    use crate::metadata::{checksum_bytes, ChecksumKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const BASE: &str = "http://mirror.test/debian";
    const INDEX: &str = "dists/stable/main/binary-amd64/Packages";

    struct Fixture {
        _temp: TempDir,
        transport: MockTransport,
        committer: Arc<MirrorCommitter>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_transport(MockTransport::new())
        }

        fn with_transport(transport: MockTransport) -> Self {
            let temp = TempDir::new().unwrap();
            let committer = Arc::new(MirrorCommitter::open(temp.path()).unwrap());
            Self {
                _temp: temp,
                transport,
                committer,
            }
        }

        fn scheduler(&self, concurrency: usize) -> DownloadScheduler {
            DownloadScheduler::new(Arc::new(self.transport.clone()), Arc::clone(&self.committer))
                .with_concurrency(concurrency)
                .with_policy(RetryPolicy::fixed(3, Duration::from_millis(1)))
        }

        /// Serve `data` at `path` and return an action for it.
        fn action(&self, path: &str, data: &[u8]) -> DownloadAction {
            let url = format!("{}/{}", BASE, path);
            self.transport.serve(&url, data.to_vec());
            DownloadAction::new(
                path,
                url,
                data.len() as u64,
                checksum_bytes(data, ChecksumKind::Sha256),
            )
        }

        fn package(&self, path: &str, data: &[u8]) -> DownloadAction {
            self.action(path, data).with_role(ActionRole::Package {
                referenced_by: vec![INDEX.to_string()],
            })
        }

        fn index(&self, data: &[u8]) -> DownloadAction {
            self.action(INDEX, data).with_role(ActionRole::Index {
                distribution: "stable".to_string(),
            })
        }

        fn published(&self, path: &str) -> Option<Vec<u8>> {
            std::fs::read(self.committer.final_path(path)).ok()
        }

        fn url(path: &str) -> String {
            format!("{}/{}", BASE, path)
        }
    }

    #[tokio::test]
    async fn test_adds_file() {
        let fixture = Fixture::new();
        let data = vec![7u8; 100];
        let actions = vec![fixture.action("pool/main/a/a.deb", &data)];

        let result = fixture.scheduler(2).run(actions, CancellationToken::new()).await;

        assert_eq!(result.files_added, 1);
        assert!(result.is_complete());
        assert_eq!(fixture.published("pool/main/a/a.deb").unwrap(), data);
    }

    #[tokio::test]
    async fn test_replace_is_counted() {
        let fixture = Fixture::new();
        let actions = vec![fixture
            .action("pool/a.deb", b"new")
            .with_kind(ChangeKind::Replace)];

        let result = fixture.scheduler(1).run(actions, CancellationToken::new()).await;
        assert_eq!(result.files_replaced, 1);
        assert_eq!(result.committed[0].kind, ChangeKind::Replace);
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let fixture = Fixture::new();
        let actions = vec![fixture.action("pool/b.deb", b"bbbb")];
        fixture
            .transport
            .fail_times(&Fixture::url("pool/b.deb"), 2, Failure::Transient);

        let result = fixture.scheduler(1).run(actions, CancellationToken::new()).await;

        let committed = result.committed_file("pool/b.deb").unwrap();
        assert_eq!(committed.attempts, 3);
        assert!(result.failures.is_empty());
        assert_eq!(fixture.transport.requests(&Fixture::url("pool/b.deb")), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_cap_and_keeps_others() {
        let fixture = Fixture::new();
        let actions = vec![
            fixture.action("pool/a.deb", b"aaaa"),
            fixture.action("pool/c.deb", b"cccc"),
        ];
        fixture
            .transport
            .fail_times(&Fixture::url("pool/c.deb"), 3, Failure::Corrupt);

        let result = fixture.scheduler(2).run(actions, CancellationToken::new()).await;

        let failure = result.failure("pool/c.deb").unwrap();
        assert_eq!(failure.reason, FailureReason::IntegrityMismatch);
        assert_eq!(failure.attempts, 3);
        assert!(fixture.published("pool/c.deb").is_none());
        assert_eq!(fixture.published("pool/a.deb").unwrap(), b"aaaa");
        assert!(!fixture.committer.staging().temp_path("pool/c.deb").exists());
    }

    #[tokio::test]
    async fn test_transient_failures_are_reported() {
        let fixture = Fixture::new();
        let actions = vec![fixture.action("pool/c.deb", b"cccc")];
        fixture
            .transport
            .fail_times(&Fixture::url("pool/c.deb"), 3, Failure::Transient);

        let result = fixture.scheduler(1).run(actions, CancellationToken::new()).await;
        assert_eq!(
            result.failure("pool/c.deb").unwrap().reason,
            FailureReason::TransportTransient
        );
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let fixture = Fixture::new();
        let checksum = checksum_bytes(b"x", ChecksumKind::Sha256);
        let actions = vec![DownloadAction::new(
            "pool/gone.deb",
            Fixture::url("pool/gone.deb"),
            1,
            checksum,
        )];

        let result = fixture.scheduler(1).run(actions, CancellationToken::new()).await;

        let failure = result.failure("pool/gone.deb").unwrap();
        assert_eq!(failure.reason, FailureReason::NotFound);
        assert_eq!(failure.attempts, 1);
    }

    #[tokio::test]
    async fn test_resumes_truncated_transfer() {
        let fixture = Fixture::new();
        let data: Vec<u8> = (0..200u8).collect();
        let actions = vec![fixture.action("pool/big.deb", &data)];
        fixture
            .transport
            .fail_times(&Fixture::url("pool/big.deb"), 1, Failure::Truncated);

        let result = fixture.scheduler(1).run(actions, CancellationToken::new()).await;

        assert_eq!(result.committed_file("pool/big.deb").unwrap().attempts, 2);
        assert_eq!(fixture.published("pool/big.deb").unwrap(), data);
        let ranges = fixture.transport.ranges();
        assert_eq!(ranges[0].1, None);
        assert_eq!(ranges[1].1, Some(100));
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let fixture =
            Fixture::with_transport(MockTransport::new().with_delay(Duration::from_millis(20)));
        let actions: Vec<_> = (0..12)
            .map(|i| fixture.action(&format!("pool/{}.deb", i), format!("file {}", i).as_bytes()))
            .collect();

        let result = fixture.scheduler(3).run(actions, CancellationToken::new()).await;

        assert_eq!(result.files_added, 12);
        assert!(fixture.transport.max_in_flight() <= 3);
        assert!(fixture.transport.max_in_flight() >= 2);
    }

    #[tokio::test]
    async fn test_index_committed_after_packages() {
        let fixture = Fixture::new();
        let actions = vec![
            fixture.index(b"index"),
            fixture.package("pool/a.deb", b"a"),
            fixture.package("pool/b.deb", b"b"),
        ];

        // Record which packages exist when the index is published.
        let committer = Arc::clone(&fixture.committer);
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let seen_in_callback = Arc::clone(&seen);
        let scheduler = fixture
            .scheduler(3)
            .with_progress(Box::new(move |_, _, _, _| {
                if committer.final_path(INDEX).exists() {
                    let present = ["pool/a.deb", "pool/b.deb"]
                        .iter()
                        .filter(|p| committer.final_path(p).exists())
                        .count();
                    seen_in_callback.fetch_min(present, Ordering::SeqCst);
                }
            }));

        let result = scheduler.run(actions, CancellationToken::new()).await;

        assert!(result.is_complete());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_index_withheld_when_package_fails() {
        let fixture = Fixture::new();
        let actions = vec![
            fixture.index(b"index"),
            fixture.package("pool/a.deb", b"a"),
            fixture.package("pool/bad.deb", b"bad"),
        ];
        fixture
            .transport
            .fail_times(&Fixture::url("pool/bad.deb"), 3, Failure::Transient);

        let result = fixture.scheduler(2).run(actions, CancellationToken::new()).await;

        assert_eq!(
            result.failure(INDEX).unwrap().reason,
            FailureReason::DependencyFailed
        );
        assert!(fixture.published(INDEX).is_none());
        assert!(fixture.published("pool/a.deb").is_some());
        assert_eq!(fixture.transport.requests(&Fixture::url(INDEX)), 0);
    }

    #[tokio::test]
    async fn test_unserved_variant_does_not_block_release() {
        let fixture = Fixture::new();
        let checksum = checksum_bytes(b"plain", ChecksumKind::Sha256);
        let plain = DownloadAction::new(INDEX, Fixture::url(INDEX), 5, checksum)
            .with_role(ActionRole::Index {
                distribution: "stable".to_string(),
            })
            .with_optional(true);
        let release = fixture
            .action("dists/stable/Release", b"Codename: stable\n")
            .with_role(ActionRole::Release {
                distribution: "stable".to_string(),
            });

        let result = fixture
            .scheduler(2)
            .run(vec![plain, release], CancellationToken::new())
            .await;

        assert!(result.is_complete());
        assert_eq!(result.not_served, vec![INDEX]);
        assert!(fixture.published("dists/stable/Release").is_some());
        assert!(fixture.published(INDEX).is_none());
    }

    #[tokio::test]
    async fn test_optional_variant_still_fails_on_other_errors() {
        let fixture = Fixture::new();
        let actions = vec![fixture.index(b"index").with_optional(true)];
        fixture
            .transport
            .fail_times(&Fixture::url(INDEX), 3, Failure::Transient);

        let result = fixture.scheduler(1).run(actions, CancellationToken::new()).await;

        assert_eq!(
            result.failure(INDEX).unwrap().reason,
            FailureReason::TransportTransient
        );
        assert!(result.not_served.is_empty());
    }

    #[tokio::test]
    async fn test_prefetched_content_skips_transport() {
        let fixture = Fixture::new();
        let data = b"Codename: stable\n";
        let action = DownloadAction::new(
            "dists/stable/Release",
            Fixture::url("dists/stable/Release"),
            data.len() as u64,
            checksum_bytes(data, ChecksumKind::Sha256),
        )
        .with_content(bytes::Bytes::from_static(data));

        let result = fixture
            .scheduler(1)
            .run(vec![action], CancellationToken::new())
            .await;

        assert!(result.is_complete());
        assert_eq!(fixture.published("dists/stable/Release").unwrap(), data);
        assert_eq!(fixture.transport.requests(&Fixture::url("dists/stable/Release")), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_drops_everything() {
        let fixture = Fixture::new();
        let actions = vec![
            fixture.action("pool/a.deb", b"a"),
            fixture.action("pool/b.deb", b"b"),
        ];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fixture.scheduler(2).run(actions, cancel).await;

        assert!(result.cancelled);
        assert_eq!(result.dropped, 2);
        assert!(result.committed.is_empty());
        assert!(fixture.published("pool/a.deb").is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_transfer() {
        let fixture =
            Fixture::with_transport(MockTransport::new().with_delay(Duration::from_secs(30)));
        let actions: Vec<_> = (0..4)
            .map(|i| fixture.action(&format!("pool/{}.deb", i), b"slow"))
            .collect();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            fixture.scheduler(2).run(actions, cancel),
        )
        .await
        .unwrap();

        assert!(result.cancelled);
        assert!(result.committed.is_empty());
        assert!(result.failures.is_empty());
        assert_eq!(result.dropped, 4);
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let fixture = Fixture::new();
        let result = fixture.scheduler(4).run(Vec::new(), CancellationToken::new()).await;
        assert_eq!(result, RunResult::default());
    }
}
