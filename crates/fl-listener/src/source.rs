//! The event source abstraction.
//!
//! An [`EventSource`] produces two independent asynchronous sequences: file
//! change events and non-fatal source errors. Both are delivered over tokio
//! mpsc channels ([`SourceChannels`]) that terminate once the source is
//! closed.
//!
//! The listener is the single reader of those channels: it takes them once
//! with [`EventSource::subscribe`] and moves them into its dispatch loop.

use camino::Utf8Path;
use tokio::sync::mpsc;

use crate::error::{SourceError, WatchError};
use crate::events::FileEvent;

/// Whether a registered path is watched with or without its subdirectories.
///
/// The exact semantics follow the underlying backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    /// Watch the path and everything beneath it.
    Recursive,
    /// Watch only the path itself (and a directory's direct entries).
    Flat,
}

impl WatchMode {
    /// Picks the mode from a `recursive` flag.
    #[inline]
    #[must_use]
    pub const fn from_recursive(recursive: bool) -> Self {
        if recursive { Self::Recursive } else { Self::Flat }
    }

    /// Returns `true` for [`WatchMode::Recursive`].
    #[inline]
    #[must_use]
    pub const fn is_recursive(self) -> bool {
        matches!(self, Self::Recursive)
    }
}

impl From<WatchMode> for notify::RecursiveMode {
    fn from(mode: WatchMode) -> Self {
        match mode {
            WatchMode::Recursive => Self::Recursive,
            WatchMode::Flat => Self::NonRecursive,
        }
    }
}

/// The receiving ends of a source's event and error sequences.
#[derive(Debug)]
pub struct SourceChannels {
    /// File change events, in the order the source produced them.
    pub events: mpsc::Receiver<FileEvent>,

    /// Non-fatal source errors.
    pub errors: mpsc::Receiver<SourceError>,
}

/// A producer of filesystem change notifications.
///
/// # Contract
///
/// - [`watch`](Self::watch) registers a path; it fails if the path cannot be
///   watched (missing, permission denied, source closed).
/// - [`subscribe`](Self::subscribe) hands out the channels exactly once.
/// - [`close`](Self::close) stops the source. After it returns, both
///   channels terminate once their buffered items are read. Closing twice
///   returns [`WatchError::AlreadyClosed`].
pub trait EventSource: Send + 'static {
    /// Registers `path` for watching.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchError`] if the path cannot be registered.
    fn watch(&mut self, path: &Utf8Path, mode: WatchMode) -> Result<(), WatchError>;

    /// Takes the source's event and error channels.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AlreadySubscribed`] on every call after the
    /// first.
    fn subscribe(&mut self) -> Result<SourceChannels, WatchError>;

    /// Closes the source, terminating both sequences.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AlreadyClosed`] if the source was already closed,
    /// or a backend error if shutting it down failed.
    fn close(&mut self) -> Result<(), WatchError>;
}
