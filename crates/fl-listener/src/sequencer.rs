//! Per-path single-flight ordering.
//!
//! When per-path ordering is enabled, each dispatched event receives a
//! [`PathTurn`] from the [`PathSequencer`]. A turn waits for the previous
//! turn on the same path to finish before its handler runs, so invocations
//! for one path execute one at a time in arrival order. Different paths do
//! not wait on each other.
//!
//! Turns are chained with oneshot channels: the map holds, per path, the
//! completion receiver of the most recent turn. A finished turn removes its
//! own entry unless a newer one replaced it, so the map only holds paths with
//! work outstanding.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

/// Completion signal of the latest turn for a path.
#[derive(Debug)]
struct Link {
    seq: u64,
    done: oneshot::Receiver<()>,
}

type Links = Arc<Mutex<FxHashMap<Utf8PathBuf, Link>>>;

/// Hands out ordered turns per path. Owned by the dispatch loop.
#[derive(Debug, Default)]
pub(crate) struct PathSequencer {
    links: Links,
    next_seq: u64,
}

impl PathSequencer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a turn for `path` behind any outstanding one.
    pub(crate) fn enqueue(&mut self, path: &Utf8Path) -> PathTurn {
        self.next_seq += 1;
        let seq = self.next_seq;
        let (done_tx, done_rx) = oneshot::channel();

        let previous = self
            .links
            .lock()
            .insert(path.to_owned(), Link { seq, done: done_rx })
            .map(|link| link.done);

        PathTurn {
            path: path.to_owned(),
            seq,
            previous,
            done: Some(done_tx),
            links: Arc::clone(&self.links),
        }
    }

    /// Returns the number of paths with outstanding turns.
    #[cfg(test)]
    pub(crate) fn pending_paths(&self) -> usize {
        self.links.lock().len()
    }
}

/// One invocation's place in its path's queue.
///
/// Dropping the turn releases the next one, whether or not the handler
/// completed normally.
#[derive(Debug)]
pub(crate) struct PathTurn {
    path: Utf8PathBuf,
    seq: u64,
    previous: Option<oneshot::Receiver<()>>,
    done: Option<oneshot::Sender<()>>,
    links: Links,
}

impl PathTurn {
    /// Waits until the previous turn on this path has finished.
    pub(crate) async fn wait(&mut self) {
        if let Some(previous) = self.previous.take() {
            // An error means the previous turn dropped its sender: it is done.
            let _ = previous.await;
        }
    }
}

impl Drop for PathTurn {
    fn drop(&mut self) {
        {
            let mut links = self.links.lock();
            if links.get(&self.path).is_some_and(|link| link.seq == self.seq) {
                links.remove(&self.path);
            }
        }
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_turn_does_not_wait() {
        let mut sequencer = PathSequencer::new();
        let mut turn = sequencer.enqueue(Utf8Path::new("a.txt"));

        let waited = tokio::time::timeout(Duration::from_millis(50), turn.wait()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_second_turn_waits_for_first() {
        let mut sequencer = PathSequencer::new();
        let first = sequencer.enqueue(Utf8Path::new("a.txt"));
        let mut second = sequencer.enqueue(Utf8Path::new("a.txt"));

        let waiter = tokio::spawn(async move {
            second.wait().await;
            second
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("second turn should be released")
            .expect("waiter task should not panic");
        drop(second);
        assert_eq!(sequencer.pending_paths(), 0);
    }

    #[tokio::test]
    async fn test_distinct_paths_are_independent() {
        let mut sequencer = PathSequencer::new();
        let _a = sequencer.enqueue(Utf8Path::new("a.txt"));
        let mut b = sequencer.enqueue(Utf8Path::new("b.txt"));

        let waited = tokio::time::timeout(Duration::from_millis(50), b.wait()).await;
        assert!(waited.is_ok());
        assert_eq!(sequencer.pending_paths(), 2);
    }

    #[tokio::test]
    async fn test_finished_turns_are_forgotten() {
        let mut sequencer = PathSequencer::new();
        let first = sequencer.enqueue(Utf8Path::new("a.txt"));
        let second = sequencer.enqueue(Utf8Path::new("a.txt"));

        drop(first);
        assert_eq!(sequencer.pending_paths(), 1);
        drop(second);
        assert_eq!(sequencer.pending_paths(), 0);
    }
}
