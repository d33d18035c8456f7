//! Filesystem listener with concurrent handler fan-out and draining shutdown.
//!
//! The listener watches one path through an [`EventSource`], invokes an
//! [`EventHandler`] once per file event in its own task, and on shutdown
//! closes the source and waits until every started invocation has finished.
//!
//! # Overview
//!
//! - Every source event yields exactly one handler invocation. Nothing is
//!   coalesced, filtered or debounced.
//! - Invocations run concurrently and are never cancelled or timed out.
//! - [`Listener::stop`] returns only once the in-flight count is zero, unless
//!   a drain timeout is configured.
//! - Source errors are logged and the loop keeps going.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   events   ┌────────────────┐  spawn   ┌──────────┐
//! │ EventSource        │ ─────────► │ dispatch loop  │ ───────► │ handler  │
//! │ NotifySource       │   errors   │ (select!)      │   ...    │ tasks    │
//! │ ManualSource       │ ─────────► │                │          └────┬─────┘
//! └────────────────────┘            └───────┬────────┘               │
//!                                           │ begin()         drop() │
//!                                           ▼                        ▼
//!                                   ┌──────────────────────────────────────┐
//!                                   │ InvocationTracker (live, peak, ...)  │
//!                                   └──────────────────────────────────────┘
//!                                                      ▲
//!                                          wait_idle() │
//!                                              Listener::stop()
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! fl-cli ──► fl-listener ──► fl-core
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use camino::Utf8Path;
//! use fl_core::Config;
//! use fl_listener::{FnHandler, Listener, NotifySource};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let handler = Arc::new(FnHandler::new(|_ctx, event| async move {
//!         tokio::time::sleep(Duration::from_secs(1)).await;
//!         tracing::info!(event = %event, "Processed");
//!         Ok(())
//!     }));
//!
//!     let mut listener =
//!         Listener::with_config(NotifySource::new(&config.watch)?, handler, &config);
//!     listener.start(Utf8Path::new("./"))?;
//!
//!     let trigger = CancellationToken::new();
//!     // Cancel `trigger` from a signal handler.
//!     listener.run_until_cancelled(&trigger).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! [`ManualSource`] is a channel-backed source whose events are pushed by
//! the test through a [`SourceFeed`], so listener behavior can be exercised
//! without touching the filesystem.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod handler;
pub mod listener;
pub mod manual;
mod sequencer;
pub mod source;
pub mod tracker;
pub mod watcher;

// Re-export error types
pub use error::{HandlerError, ListenerError, SourceError, WatchError};

// Re-export event types
pub use events::{EventKind, FileEvent};

// Re-export handler types
pub use handler::{EventHandler, FnHandler, HandlerContext, HandlerResult};

// Re-export listener types
pub use listener::{Listener, ListenerState};

// Re-export source types
pub use manual::{ManualSource, SourceFeed};
pub use source::{EventSource, SourceChannels, WatchMode};
pub use watcher::NotifySource;

// Re-export tracking types
pub use tracker::{InvocationGuard, InvocationTracker, TrackerSnapshot};
