//! Event types for file change notifications.
//!
//! A [`FileEvent`] is the value the dispatch loop hands to the handler: a
//! UTF-8 path plus an [`EventKind`]. Sources build events either directly
//! ([`FileEvent::new`]) or by translating raw `notify` events
//! ([`FileEvent::from_notify`]).
//!
//! # Event Flow
//!
//! ```text
//! File System Change
//!        │
//!        ▼
//!   notify backend (inotify / FSEvents / kqueue / ...)
//!        │
//!        ▼
//!   FileEvent::from_notify  ── Rescan flag ──► SourceError::Overflow
//!        │
//!        ▼
//!   event channel ──► dispatch loop ──► handler task
//! ```

use std::fmt;
use std::time::Instant;

use camino::Utf8PathBuf;
use notify::event::{EventKind as NotifyKind, ModifyKind};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// The operation a [`FileEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A file or directory was created.
    Create,
    /// File contents changed.
    Write,
    /// A file or directory was removed.
    Remove,
    /// A file or directory was renamed or moved.
    Rename,
    /// Permissions or other metadata changed.
    Chmod,
    /// A platform-specific change the backend could not classify.
    Other,
}

impl EventKind {
    /// Returns the uppercase label used when displaying events.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Write => "WRITE",
            Self::Remove => "REMOVE",
            Self::Rename => "RENAME",
            Self::Chmod => "CHMOD",
            Self::Other => "OTHER",
        }
    }

    /// Maps a `notify` event kind, returning `None` for kinds that do not
    /// describe a change (file access).
    #[must_use]
    pub const fn from_notify(kind: &NotifyKind) -> Option<Self> {
        match kind {
            NotifyKind::Create(_) => Some(Self::Create),
            NotifyKind::Modify(ModifyKind::Name(_)) => Some(Self::Rename),
            NotifyKind::Modify(ModifyKind::Metadata(_)) => Some(Self::Chmod),
            NotifyKind::Modify(_) => Some(Self::Write),
            NotifyKind::Remove(_) => Some(Self::Remove),
            NotifyKind::Any | NotifyKind::Other => Some(Self::Other),
            NotifyKind::Access(_) => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single filesystem change.
///
/// # Examples
///
/// ```
/// use fl_listener::{EventKind, FileEvent};
/// use camino::Utf8PathBuf;
///
/// let event = FileEvent::new(Utf8PathBuf::from("/tmp/a.txt"), EventKind::Create);
/// assert_eq!(event.to_string(), r#"CREATE "/tmp/a.txt""#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// The path that changed.
    pub path: Utf8PathBuf,

    /// What happened to the path.
    pub kind: EventKind,

    /// When the source produced this event.
    pub timestamp: Instant,
}

impl FileEvent {
    /// Creates a new event timestamped now.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: Instant::now(),
        }
    }

    /// Translates a raw `notify` event into one [`FileEvent`] per path.
    ///
    /// Access events produce nothing. Paths that are not valid UTF-8 are
    /// logged and skipped. Callers should check [`notify::Event::need_rescan`]
    /// first, since a rescan event signals lost events rather than a change.
    #[must_use]
    pub fn from_notify(event: notify::Event) -> SmallVec<[Self; 2]> {
        let Some(kind) = EventKind::from_notify(&event.kind) else {
            tracing::trace!(kind = ?event.kind, "Ignoring access event");
            return SmallVec::new();
        };

        let timestamp = Instant::now();
        event
            .paths
            .into_iter()
            .filter_map(|path| match Utf8PathBuf::try_from(path) {
                Ok(path) => Some(Self {
                    path,
                    kind,
                    timestamp,
                }),
                Err(e) => {
                    tracing::warn!(
                        path = %e.into_path_buf().display(),
                        "Skipping non-UTF-8 path in file event"
                    );
                    None
                }
            })
            .collect()
    }

    /// Returns the file name without the directory path.
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.kind, self.path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{
        AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode,
    };
    use std::path::PathBuf;

    fn notify_event(kind: NotifyKind, paths: &[&str]) -> notify::Event {
        paths
            .iter()
            .fold(notify::Event::new(kind), |event, path| {
                event.add_path(PathBuf::from(path))
            })
    }

    #[test]
    fn test_event_kind_mapping() {
        let cases = [
            (NotifyKind::Create(CreateKind::File), Some(EventKind::Create)),
            (
                NotifyKind::Modify(ModifyKind::Data(DataChange::Content)),
                Some(EventKind::Write),
            ),
            (NotifyKind::Modify(ModifyKind::Any), Some(EventKind::Write)),
            (
                NotifyKind::Modify(ModifyKind::Name(RenameMode::From)),
                Some(EventKind::Rename),
            ),
            (
                NotifyKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                Some(EventKind::Chmod),
            ),
            (NotifyKind::Remove(RemoveKind::File), Some(EventKind::Remove)),
            (NotifyKind::Other, Some(EventKind::Other)),
            (NotifyKind::Access(AccessKind::Read), None),
        ];

        for (kind, expected) in cases {
            assert_eq!(EventKind::from_notify(&kind), expected, "{kind:?}");
        }
    }

    #[test]
    fn test_file_event_display() {
        let event = FileEvent::new("dir/a.txt", EventKind::Write);
        assert_eq!(event.to_string(), r#"WRITE "dir/a.txt""#);
        assert_eq!(event.file_name(), Some("a.txt"));
    }

    #[test]
    fn test_from_notify_one_event_per_path() {
        let raw = notify_event(
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/w/old.txt", "/w/new.txt"],
        );

        let events = FileEvent::from_notify(raw);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EventKind::Rename));
        assert_eq!(events[0].path.as_str(), "/w/old.txt");
        assert_eq!(events[1].path.as_str(), "/w/new.txt");
    }

    #[test]
    fn test_from_notify_skips_access() {
        let raw = notify_event(NotifyKind::Access(AccessKind::Any), &["/w/a.txt"]);
        assert!(FileEvent::from_notify(raw).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_from_notify_skips_non_utf8_paths() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let invalid = PathBuf::from(OsStr::from_bytes(b"/w/\xff.txt"));
        let raw = notify::Event::new(NotifyKind::Create(CreateKind::File))
            .add_path(invalid)
            .add_path(PathBuf::from("/w/ok.txt"));

        let events = FileEvent::from_notify(raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path.as_str(), "/w/ok.txt");
    }
}
