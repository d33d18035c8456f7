//! The production event source, backed by `notify`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    notify backend thread                        │
//! │  ┌───────────────────┐    ┌──────────────────────────────────┐  │
//! │  │ RecommendedWatcher│ -> │ callback                         │  │
//! │  │ (notify)          │    │ (FileEvent::from_notify, rescan) │  │
//! │  └───────────────────┘    └───────────────┬──────────────────┘  │
//! └───────────────────────────────────────────│─────────────────────┘
//!                                             │ blocking_send
//!                                             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Async Runtime (tokio)                        │
//! │      mpsc::Receiver<FileEvent>    mpsc::Receiver<SourceError>   │
//! │                 └──────────► dispatch loop ◄──────┘             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The callback owns the only senders. Closing the source drops the
//! watcher, which drops the callback and with it the senders, so both
//! channels terminate after their buffered items.

use camino::{Utf8Path, Utf8PathBuf};
use notify::Watcher;
use tokio::sync::mpsc;

use fl_core::WatchConfig;

use crate::error::{SourceError, WatchError};
use crate::events::FileEvent;
use crate::source::{EventSource, SourceChannels, WatchMode};

/// An [`EventSource`] over the platform's recommended `notify` watcher.
///
/// Registered paths are canonicalized, so event paths are absolute.
///
/// # Examples
///
/// ```no_run
/// use fl_listener::{EventSource, NotifySource, WatchMode};
/// use fl_core::WatchConfig;
/// use camino::Utf8Path;
///
/// # fn example() -> Result<(), fl_listener::WatchError> {
/// let mut source = NotifySource::new(&WatchConfig::default())?;
/// source.watch(Utf8Path::new("./src"), WatchMode::Recursive)?;
/// let channels = source.subscribe()?;
/// # drop(channels);
/// # Ok(())
/// # }
/// ```
pub struct NotifySource {
    /// The backend watcher. `None` after close.
    watcher: Option<notify::RecommendedWatcher>,

    /// Channels not yet handed to a reader.
    channels: Option<SourceChannels>,

    /// Canonical paths registered so far.
    watched: Vec<Utf8PathBuf>,
}

impl std::fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySource")
            .field("watched", &self.watched)
            .field("is_closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl NotifySource {
    /// Creates the backend watcher and its channels.
    ///
    /// Nothing is watched until [`EventSource::watch`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the backend fails to initialize
    /// (e.g. the inotify instance limit is reached).
    pub fn new(config: &WatchConfig) -> Result<Self, WatchError> {
        let capacity = config.channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            forward(res, &event_tx, &error_tx);
        })?;

        Ok(Self {
            watcher: Some(watcher),
            channels: Some(SourceChannels {
                events: event_rx,
                errors: error_rx,
            }),
            watched: Vec::new(),
        })
    }

    /// Returns the canonical paths registered so far.
    #[must_use]
    pub fn watched(&self) -> &[Utf8PathBuf] {
        &self.watched
    }

    /// Returns `true` once the source has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.watcher.is_none()
    }
}

impl EventSource for NotifySource {
    fn watch(&mut self, path: &Utf8Path, mode: WatchMode) -> Result<(), WatchError> {
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(WatchError::AlreadyClosed);
        };

        if !path.exists() {
            return Err(WatchError::path_not_found(path));
        }
        let canonical = match path.canonicalize_utf8() {
            Ok(canonical) => canonical,
            // camino reports a non-UTF-8 result as InvalidData.
            Err(error) if error.kind() == std::io::ErrorKind::InvalidData => {
                return Err(WatchError::non_utf8_path(std::fs::canonicalize(path)?));
            }
            Err(error) => return Err(error.into()),
        };

        watcher.watch(canonical.as_std_path(), mode.into())?;
        tracing::debug!(path = %canonical, recursive = mode.is_recursive(), "Registered watch");

        self.watched.push(canonical);
        Ok(())
    }

    fn subscribe(&mut self) -> Result<SourceChannels, WatchError> {
        self.channels.take().ok_or(WatchError::AlreadySubscribed)
    }

    fn close(&mut self) -> Result<(), WatchError> {
        let Some(watcher) = self.watcher.take() else {
            return Err(WatchError::AlreadyClosed);
        };
        drop(watcher);
        self.watched.clear();
        Ok(())
    }
}

/// Forwards one backend result into the channels.
///
/// Runs on the backend's own thread, so blocking sends are allowed and apply
/// backpressure when the dispatch loop falls behind.
fn forward(
    res: notify::Result<notify::Event>,
    event_tx: &mpsc::Sender<FileEvent>,
    error_tx: &mpsc::Sender<SourceError>,
) {
    match res {
        Ok(event) if event.need_rescan() => {
            if error_tx.blocking_send(SourceError::Overflow).is_err() {
                tracing::debug!("Error channel closed, dropping overflow notice");
            }
        }
        Ok(event) => {
            for file_event in FileEvent::from_notify(event) {
                if event_tx.blocking_send(file_event).is_err() {
                    tracing::debug!("Event channel closed, dropping file event");
                    break;
                }
            }
        }
        Err(error) => {
            if error_tx.blocking_send(SourceError::Backend(error)).is_err() {
                tracing::debug!("Error channel closed, dropping source error");
            }
        }
    }
}
