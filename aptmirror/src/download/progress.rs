//! Progress reporting for a sync run.
//!
//! Workers update shared atomic counters as actions finish; the scheduler
//! forwards a snapshot to an optional callback after every change.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Progress callback for a sync run.
///
/// # Arguments
///
/// * `bytes_done` - Bytes of finished actions (committed or given up)
/// * `total_bytes` - Expected bytes of all actions
/// * `actions_done` - Number of actions in a terminal state
/// * `total_actions` - Number of actions in the plan
pub type SyncProgressCallback = Box<dyn Fn(u64, u64, usize, usize) + Send + Sync>;

/// Shared progress counters for the worker pool.
#[derive(Debug)]
pub struct ProgressCounters {
    bytes_done: AtomicU64,
    actions_done: AtomicUsize,
    total_bytes: u64,
    total_actions: usize,
}

impl ProgressCounters {
    /// Create counters for a plan of `total_actions` actions.
    pub fn new(total_actions: usize, total_bytes: u64) -> Self {
        Self {
            bytes_done: AtomicU64::new(0),
            actions_done: AtomicUsize::new(0),
            total_bytes,
            total_actions,
        }
    }

    /// Record a finished action of `bytes` expected bytes.
    pub fn mark_finished(&self, bytes: u64) {
        self.bytes_done.fetch_add(bytes, Ordering::SeqCst);
        self.actions_done.fetch_add(1, Ordering::SeqCst);
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::SeqCst)
    }

    pub fn actions_done(&self) -> usize {
        self.actions_done.load(Ordering::SeqCst)
    }

    /// Returns true once every action has finished.
    pub fn is_done(&self) -> bool {
        self.actions_done() >= self.total_actions
    }

    /// Invoke `callback` with the current snapshot.
    pub fn report(&self, callback: &SyncProgressCallback) {
        callback(
            self.bytes_done(),
            self.total_bytes,
            self.actions_done(),
            self.total_actions,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_progress_counters_new() {
        let counters = ProgressCounters::new(3, 300);
        assert_eq!(counters.bytes_done(), 0);
        assert_eq!(counters.actions_done(), 0);
        assert!(!counters.is_done());
    }

    #[test]
    fn test_progress_counters_mark_finished() {
        let counters = ProgressCounters::new(2, 800);

        counters.mark_finished(500);
        counters.mark_finished(300);

        assert_eq!(counters.bytes_done(), 800);
        assert_eq!(counters.actions_done(), 2);
        assert!(counters.is_done());
    }

    #[test]
    fn test_report_passes_snapshot() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: SyncProgressCallback = Box::new(move |bytes, total, done, actions| {
            sink.lock().unwrap().push((bytes, total, done, actions));
        });

        let counters = ProgressCounters::new(4, 1000);
        counters.mark_finished(250);
        counters.report(&callback);

        assert_eq!(*seen.lock().unwrap(), vec![(250, 1000, 1, 4)]);
    }
}
