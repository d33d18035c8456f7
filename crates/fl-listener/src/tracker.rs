//! Live-invocation tracking with atomic counters.
//!
//! [`InvocationTracker`] counts handler invocations as they start and finish,
//! and lets shutdown wait until none are left. [`TrackerSnapshot`] is a
//! point-in-time copy for display or assertions.
//!
//! # Thread Safety
//!
//! The live counter uses acquire/release ordering because drain waiters act
//! on it. The statistics counters (`started`, `completed`, `failed`,
//! `dropped`, `peak`) are informational and use relaxed ordering.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use fl_listener::InvocationTracker;
//!
//! let tracker = Arc::new(InvocationTracker::new());
//! let guard = InvocationTracker::begin(&tracker);
//! assert_eq!(tracker.live(), 1);
//!
//! drop(guard);
//! let snap = tracker.snapshot();
//! assert_eq!(snap.live, 0);
//! assert_eq!(snap.completed, 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Shared counter of in-flight handler invocations.
///
/// Every invocation holds an [`InvocationGuard`] obtained from
/// [`begin`](Self::begin); dropping the guard marks it finished, including
/// when the handler panics. The live count therefore never underflows and is
/// zero only when no guard exists.
#[derive(Debug, Default)]
pub struct InvocationTracker {
    /// Invocations currently holding a guard.
    live: AtomicUsize,
    /// Highest value `live` has reached.
    peak: AtomicUsize,
    /// Guards handed out.
    started: AtomicU64,
    /// Guards dropped.
    completed: AtomicU64,
    /// Invocations that reported failure or panicked.
    failed: AtomicU64,
    /// Events discarded because every handler slot was busy.
    dropped: AtomicU64,
    /// Wakes drain waiters when `live` returns to zero.
    idle: Notify,
}

impl InvocationTracker {
    /// Creates a tracker with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new in-flight invocation and returns its guard.
    #[must_use = "dropping the guard immediately marks the invocation finished"]
    pub fn begin(this: &Arc<Self>) -> InvocationGuard {
        let live = this.live.fetch_add(1, Ordering::AcqRel) + 1;
        this.peak.fetch_max(live, Ordering::Relaxed);
        this.started.fetch_add(1, Ordering::Relaxed);
        InvocationGuard {
            tracker: Arc::clone(this),
            failed: false,
        }
    }

    /// Counts an event that was discarded instead of handled.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of invocations currently in flight.
    #[inline]
    #[must_use]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Returns `true` when no invocation is in flight.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.live() == 0
    }

    /// Waits until no invocation is in flight.
    ///
    /// Returns immediately if the tracker is already idle.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a decrement between the
            // check and the await cannot be missed.
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            live: self.live(),
            peak: self.peak.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn finish(&self, failed: bool) {
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed);

        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Marks one in-flight invocation. Finishes it on drop.
#[derive(Debug)]
pub struct InvocationGuard {
    tracker: Arc<InvocationTracker>,
    failed: bool,
}

impl InvocationGuard {
    /// Records the invocation as failed when the guard is dropped.
    #[inline]
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        let failed = self.failed || std::thread::panicking();
        self.tracker.finish(failed);
    }
}

/// A point-in-time copy of [`InvocationTracker`] counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Invocations in flight.
    pub live: usize,
    /// Highest number of simultaneous invocations seen.
    pub peak: usize,
    /// Invocations started.
    pub started: u64,
    /// Invocations finished, successfully or not.
    pub completed: u64,
    /// Invocations that failed or panicked.
    pub failed: u64,
    /// Events dropped because of the concurrency bound.
    pub dropped: u64,
}

impl TrackerSnapshot {
    /// Returns the number of invocations that finished successfully.
    #[inline]
    #[must_use]
    pub const fn succeeded(&self) -> u64 {
        self.completed.saturating_sub(self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_tracker_is_idle() {
        let tracker = InvocationTracker::new();
        assert!(tracker.is_idle());
        assert_eq!(tracker.snapshot(), TrackerSnapshot::default());
    }

    #[test]
    fn test_guard_counts_and_peak() {
        let tracker = Arc::new(InvocationTracker::new());
        let a = InvocationTracker::begin(&tracker);
        let b = InvocationTracker::begin(&tracker);
        let mut c = InvocationTracker::begin(&tracker);
        assert_eq!(tracker.live(), 3);

        c.mark_failed();
        drop(c);
        drop(a);
        assert_eq!(tracker.live(), 1);

        let d = InvocationTracker::begin(&tracker);
        drop(b);
        drop(d);

        let snap = tracker.snapshot();
        assert_eq!(snap.live, 0);
        assert_eq!(snap.peak, 3);
        assert_eq!(snap.started, 4);
        assert_eq!(snap.completed, 4);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.succeeded(), 3);
    }

    #[test]
    fn test_panicking_invocation_counts_as_failed() {
        let tracker = Arc::new(InvocationTracker::new());
        let in_thread = Arc::clone(&tracker);

        let joined = std::thread::spawn(move || {
            let _guard = InvocationTracker::begin(&in_thread);
            panic!("handler blew up");
        })
        .join();

        assert!(joined.is_err());
        let snap = tracker.snapshot();
        assert_eq!(snap.live, 0);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn test_record_dropped() {
        let tracker = InvocationTracker::new();
        tracker.record_dropped();
        tracker.record_dropped();
        assert_eq!(tracker.snapshot().dropped, 2);
        assert!(tracker.is_idle());
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_idle() {
        let tracker = InvocationTracker::new();
        let waited = tokio::time::timeout(Duration::from_millis(100), tracker.wait_idle()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_wait_idle_waits_for_all_guards() {
        let tracker = Arc::new(InvocationTracker::new());
        let mut tasks = Vec::new();

        for i in 0..32_u64 {
            let guard = InvocationTracker::begin(&tracker);
            tasks.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 + i % 7)).await;
                drop(guard);
            }));
        }

        tokio::time::timeout(Duration::from_secs(5), tracker.wait_idle())
            .await
            .expect("tracker should drain");

        let snap = tracker.snapshot();
        assert_eq!(snap.live, 0);
        assert_eq!(snap.started, 32);
        assert_eq!(snap.completed, 32);

        for task in tasks {
            task.await.expect("task should not panic");
        }
    }

    #[tokio::test]
    async fn test_wait_idle_blocks_while_guard_held() {
        let tracker = Arc::new(InvocationTracker::new());
        let guard = InvocationTracker::begin(&tracker);

        let early = tokio::time::timeout(Duration::from_millis(50), tracker.wait_idle()).await;
        assert!(early.is_err());

        drop(guard);
        let late = tokio::time::timeout(Duration::from_millis(100), tracker.wait_idle()).await;
        assert!(late.is_ok());
    }
}
