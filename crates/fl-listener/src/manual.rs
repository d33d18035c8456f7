//! An in-process event source driven by code.
//!
//! [`ManualSource`] implements [`EventSource`] without touching the OS. The
//! paired [`SourceFeed`] pushes events and errors into it. Closing the source
//! drops every sender it shares with the feed, so the channels terminate
//! exactly as they would for a real backend.
//!
//! # Examples
//!
//! ```
//! use fl_listener::{EventKind, EventSource, FileEvent, ManualSource, WatchMode};
//! use camino::Utf8Path;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), fl_listener::WatchError> {
//! let (mut source, feed) = ManualSource::new(16);
//! source.watch(Utf8Path::new("."), WatchMode::Flat)?;
//! let mut channels = source.subscribe()?;
//!
//! assert!(feed.event(FileEvent::new("./a.txt", EventKind::Create)).await);
//! source.close()?;
//!
//! assert!(channels.events.recv().await.is_some());
//! assert!(channels.events.recv().await.is_none());
//! assert!(!feed.event(FileEvent::new("./b.txt", EventKind::Create)).await);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{SourceError, WatchError};
use crate::events::FileEvent;
use crate::source::{EventSource, SourceChannels, WatchMode};

/// Sending halves shared between the source and its feed.
///
/// `None` once the source is closed.
#[derive(Debug)]
struct Senders {
    events: mpsc::Sender<FileEvent>,
    errors: mpsc::Sender<SourceError>,
}

type SharedSenders = Arc<Mutex<Option<Senders>>>;

/// An [`EventSource`] fed programmatically through a [`SourceFeed`].
///
/// `watch` only checks that the path exists and records it.
#[derive(Debug)]
pub struct ManualSource {
    senders: SharedSenders,
    channels: Option<SourceChannels>,
    watched: Vec<(Utf8PathBuf, WatchMode)>,
}

impl ManualSource {
    /// Creates a source whose channels buffer up to `capacity` items each,
    /// together with the feed that drives it.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, SourceFeed) {
        let capacity = capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);

        let senders = Arc::new(Mutex::new(Some(Senders {
            events: event_tx,
            errors: error_tx,
        })));

        let source = Self {
            senders: Arc::clone(&senders),
            channels: Some(SourceChannels {
                events: event_rx,
                errors: error_rx,
            }),
            watched: Vec::new(),
        };

        (source, SourceFeed { senders })
    }

    /// Returns the paths registered so far, with their modes.
    #[must_use]
    pub fn watched(&self) -> &[(Utf8PathBuf, WatchMode)] {
        &self.watched
    }

    /// Returns `true` once the source has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.senders.lock().is_none()
    }
}

impl EventSource for ManualSource {
    fn watch(&mut self, path: &Utf8Path, mode: WatchMode) -> Result<(), WatchError> {
        if self.is_closed() {
            return Err(WatchError::AlreadyClosed);
        }
        if !path.exists() {
            return Err(WatchError::path_not_found(path));
        }
        self.watched.push((path.to_owned(), mode));
        Ok(())
    }

    fn subscribe(&mut self) -> Result<SourceChannels, WatchError> {
        self.channels.take().ok_or(WatchError::AlreadySubscribed)
    }

    fn close(&mut self) -> Result<(), WatchError> {
        match self.senders.lock().take() {
            Some(_) => Ok(()),
            None => Err(WatchError::AlreadyClosed),
        }
    }
}

/// The producing side of a [`ManualSource`].
///
/// Cloneable; every clone feeds the same source.
#[derive(Debug, Clone)]
pub struct SourceFeed {
    senders: SharedSenders,
}

impl SourceFeed {
    /// Delivers an event, waiting for channel capacity if needed.
    ///
    /// Returns `false` if the source is closed or nobody reads its channels.
    pub async fn event(&self, event: FileEvent) -> bool {
        let tx = self.senders.lock().as_ref().map(|s| s.events.clone());
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Delivers a source error, waiting for channel capacity if needed.
    ///
    /// Returns `false` if the source is closed or nobody reads its channels.
    pub async fn error(&self, error: SourceError) -> bool {
        let tx = self.senders.lock().as_ref().map(|s| s.errors.clone());
        match tx {
            Some(tx) => tx.send(error).await.is_ok(),
            None => false,
        }
    }

    /// Returns `true` once the source has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.senders.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_watch_records_existing_path() {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let path = Utf8Path::from_path(dir.path()).expect("Invalid path");
        let (mut source, _feed) = ManualSource::new(4);

        source
            .watch(path, WatchMode::Recursive)
            .expect("watch should succeed");
        assert_eq!(source.watched(), &[(path.to_owned(), WatchMode::Recursive)]);
    }

    #[test]
    fn test_watch_missing_path_fails() {
        let (mut source, _feed) = ManualSource::new(4);
        let result = source.watch(Utf8Path::new("/nonexistent/path/for/listener"), WatchMode::Flat);
        assert!(matches!(result, Err(WatchError::PathNotFound(_))));
        assert!(source.watched().is_empty());
    }

    #[test]
    fn test_subscribe_only_once() {
        let (mut source, _feed) = ManualSource::new(4);
        assert!(source.subscribe().is_ok());
        assert!(matches!(
            source.subscribe(),
            Err(WatchError::AlreadySubscribed)
        ));
    }

    #[test]
    fn test_close_twice_reports_already_closed() {
        let (mut source, feed) = ManualSource::new(4);
        assert!(source.close().is_ok());
        assert!(source.is_closed());
        assert!(feed.is_closed());
        assert!(matches!(source.close(), Err(WatchError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn test_close_terminates_both_channels_after_buffered_items() {
        let (mut source, feed) = ManualSource::new(4);
        let mut channels = source.subscribe().expect("subscribe");

        assert!(feed.event(FileEvent::new("a.txt", EventKind::Write)).await);
        assert!(feed.error(SourceError::Overflow).await);
        source.close().expect("close");

        let event = channels.events.recv().await.expect("buffered event");
        assert_eq!(event.path.as_str(), "a.txt");
        assert!(channels.events.recv().await.is_none());

        assert!(matches!(
            channels.errors.recv().await,
            Some(SourceError::Overflow)
        ));
        assert!(channels.errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_feed_rejects_after_close() {
        let (mut source, feed) = ManualSource::new(4);
        let _channels = source.subscribe().expect("subscribe");
        source.close().expect("close");

        assert!(!feed.event(FileEvent::new("a.txt", EventKind::Create)).await);
        assert!(!feed.error(SourceError::other("late")).await);
    }
}
