//! Error types for the fl-listener crate.
//!
//! - [`WatchError`]: failures of an event source (registration, close).
//! - [`SourceError`]: non-fatal errors delivered by a running event source.
//! - [`HandlerError`]: failure reported by an [`EventHandler`](crate::EventHandler).
//! - [`ListenerError`]: failures of the listener lifecycle operations.

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::listener::ListenerState;

/// Errors raised by an event source outside its event stream.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - the backend failed
/// - **Path not found** ([`WatchError::PathNotFound`]): Fatal - path must exist
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip and continue
/// - **I/O errors** ([`WatchError::Io`]): Fatal - propagate immediately
/// - **Already closed** ([`WatchError::AlreadyClosed`]): Recoverable - nothing left to close
/// - **Already subscribed** ([`WatchError::AlreadySubscribed`]): Fatal - channels have one reader
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The specified path does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source has already been closed.
    #[error("event source is already closed")]
    AlreadyClosed,

    /// The source's channels were already handed to a reader.
    #[error("event source channels were already taken")]
    AlreadySubscribed,
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error is recoverable.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_) | Self::AlreadyClosed)
    }

    /// Returns `true` if this error is fatal.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

/// A non-fatal error surfaced by a running event source.
///
/// Delivered on the source's error channel. The listener logs it and keeps
/// dispatching.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SourceError {
    /// The backend's event queue overflowed and events were lost.
    #[error("event queue overflowed, some events were lost")]
    Overflow,

    /// The notify backend reported an error.
    #[error("event source error: {0}")]
    Backend(#[from] notify::Error),

    /// Any other source failure, described by a message.
    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Creates a new [`SourceError::Other`] error.
    #[inline]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Failure reported by an event handler invocation.
///
/// The listener logs and counts it but never retries.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler failed for the given reason.
    #[error("{0}")]
    Failed(String),

    /// The handler failed with an underlying error.
    ///
    /// Displays the underlying error's message and does not repeat it as the
    /// error source.
    #[error("{0}")]
    Source(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Creates a new [`HandlerError::Failed`] error.
    #[inline]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for HandlerError {
    fn from(error: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Source(error)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(error: std::io::Error) -> Self {
        Self::Source(Box::new(error))
    }
}

/// Errors returned by [`Listener`](crate::Listener) lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The watched path could not be registered with the event source.
    ///
    /// The listener stays idle and no dispatch loop is started.
    #[error("cannot add {path} path to filesystem listener: {source}")]
    Registration {
        /// The path that failed to register.
        path: Utf8PathBuf,
        /// The underlying source failure.
        #[source]
        source: WatchError,
    },

    /// Closing the event source failed during `stop`.
    ///
    /// In-flight handlers were still waited for.
    #[error("failed to close filesystem listener: {0}")]
    Shutdown(#[source] WatchError),

    /// In-flight handlers did not finish within the drain timeout.
    ///
    /// The remaining invocations keep running in the background.
    #[error("{remaining} handler(s) still running after {timeout:?} drain timeout")]
    DrainTimeout {
        /// Invocations still running when the timeout expired.
        remaining: usize,
        /// The configured drain timeout.
        timeout: Duration,
    },

    /// The operation is not valid in the listener's current state.
    #[error("cannot {operation} listener in {state} state")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the listener was in.
        state: ListenerState,
    },

    /// `start` was called outside a tokio runtime.
    #[error("listener must be started from within a tokio runtime")]
    NoRuntime,
}

impl ListenerError {
    /// Returns the watched path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Registration { path, .. } => Some(path),
            Self::Shutdown(_)
            | Self::DrainTimeout { .. }
            | Self::InvalidState { .. }
            | Self::NoRuntime => None,
        }
    }
}
