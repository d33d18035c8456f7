//! The filesystem listener.
//!
//! [`Listener`] owns an [`EventSource`], runs a single dispatch loop over its
//! event and error channels, and spawns one handler task per event. Every
//! task is tracked by an [`InvocationTracker`], so [`Listener::stop`] can
//! close the source and then wait until no handler is left running.
//!
//! # Lifecycle
//!
//! ```text
//!  Idle ──start()──► Watching ──stop()──► Draining ──handlers done──► Stopped
//!    │                                                                  ▲
//!    └─────────────────────────────stop()───────────────────────────────┘
//! ```
//!
//! # Dispatch
//!
//! ```text
//!  events ─┐                         ┌─► tokio::spawn(handler.handle(e1))
//!          ├─► select! ─► admit ─► ──┼─► tokio::spawn(handler.handle(e2))
//!  errors ─┘   (log)     (bound)     └─► ...
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use fl_core::Config;
//! use fl_listener::{FnHandler, Listener, NotifySource};
//! use camino::Utf8Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let source = NotifySource::new(&config.watch)?;
//! let handler = Arc::new(FnHandler::new(|_ctx, event| async move {
//!     tracing::info!(event = %event, "Changed");
//!     Ok(())
//! }));
//!
//! let mut listener = Listener::with_config(source, handler, &config);
//! listener.start(Utf8Path::new("./"))?;
//!
//! tokio::signal::ctrl_c().await?;
//! listener.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, debug, error, info, info_span, warn};

use fl_core::{Config, DispatchConfig, OverloadPolicy};

use crate::error::{ListenerError, WatchError};
use crate::events::FileEvent;
use crate::handler::{EventHandler, HandlerContext};
use crate::sequencer::{PathSequencer, PathTurn};
use crate::source::{EventSource, SourceChannels, WatchMode};
use crate::tracker::{InvocationGuard, InvocationTracker, TrackerSnapshot};

/// Lifecycle state of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    /// Created, not yet watching.
    Idle,
    /// Watching a path and dispatching events.
    Watching,
    /// Source closed, waiting for in-flight handlers.
    Draining,
    /// Every handler finished. Terminal.
    Stopped,
}

impl ListenerState {
    /// Returns a lowercase label suitable for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Watching => "watching",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Watches a path through an [`EventSource`] and fans events out to an
/// [`EventHandler`].
///
/// The listener owns the source and closes it in [`stop`](Self::stop). The
/// handler is shared: the caller keeps its own `Arc` and controls its
/// lifetime.
///
/// # Logging
///
/// All records are emitted through the dispatcher given to
/// [`with_dispatch`](Self::with_dispatch), or through the dispatcher current
/// at the time of each call when none was given.
pub struct Listener<S: EventSource> {
    source: S,
    handler: Arc<dyn EventHandler>,
    config: Config,
    tracker: Arc<InvocationTracker>,
    state: Arc<watch::Sender<ListenerState>>,
    /// Cancelled when `stop` begins. Handed to handlers through their context.
    shutdown: CancellationToken,
    dispatch: Option<Dispatch>,
    loop_handle: Option<JoinHandle<()>>,
    watch_path: Option<Utf8PathBuf>,
}

impl<S: EventSource> fmt::Debug for Listener<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("state", &self.state())
            .field("watch_path", &self.watch_path)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<S: EventSource> Listener<S> {
    /// Creates an idle listener with the default configuration.
    pub fn new(source: S, handler: Arc<dyn EventHandler>) -> Self {
        Self::with_config(source, handler, &Config::default())
    }

    /// Creates an idle listener with the given configuration.
    ///
    /// Only the `watch.recursive`, `dispatch` and `shutdown` settings are read
    /// here; channel capacity belongs to the source.
    pub fn with_config(source: S, handler: Arc<dyn EventHandler>, config: &Config) -> Self {
        let (state, _) = watch::channel(ListenerState::Idle);
        Self {
            source,
            handler,
            config: config.clone(),
            tracker: Arc::new(InvocationTracker::new()),
            state: Arc::new(state),
            shutdown: CancellationToken::new(),
            dispatch: None,
            loop_handle: None,
            watch_path: None,
        }
    }

    /// Routes every log record of this listener and its tasks to `dispatch`.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: impl Into<Dispatch>) -> Self {
        self.dispatch = Some(dispatch.into());
        self
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state transition.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Returns the shared invocation tracker.
    #[must_use]
    pub const fn tracker(&self) -> &Arc<InvocationTracker> {
        &self.tracker
    }

    /// Returns a snapshot of the invocation counters.
    #[must_use]
    pub fn stats(&self) -> TrackerSnapshot {
        self.tracker.snapshot()
    }

    /// Returns the path passed to a successful [`start`](Self::start).
    #[must_use]
    pub fn watch_path(&self) -> Option<&Utf8Path> {
        self.watch_path.as_deref()
    }

    /// Returns the event source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Registers `path` with the source and starts the dispatch loop.
    ///
    /// Must be called from within a tokio runtime. The loop runs as its own
    /// task until the source's channels close.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::InvalidState`] unless the listener is idle.
    /// - [`ListenerError::NoRuntime`] outside a tokio runtime.
    /// - [`ListenerError::Registration`] if the source rejects the path. The
    ///   listener stays idle and no loop is started.
    pub fn start(&mut self, path: &Utf8Path) -> Result<(), ListenerError> {
        let dispatch = self.current_dispatch();
        tracing::dispatcher::with_default(&dispatch, || self.start_with(path, dispatch.clone()))
    }

    fn start_with(&mut self, path: &Utf8Path, dispatch: Dispatch) -> Result<(), ListenerError> {
        let state = self.state();
        if state != ListenerState::Idle {
            warn!(path = %path, state = %state, "Rejecting start of filesystem listener");
            return Err(ListenerError::InvalidState {
                operation: "start",
                state,
            });
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;

        let mode = WatchMode::from_recursive(self.config.watch.recursive);
        let registration = |source: WatchError| ListenerError::Registration {
            path: path.to_owned(),
            source,
        };
        self.source.watch(path, mode).map_err(registration)?;
        let channels = self.source.subscribe().map_err(registration)?;

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.handler),
            Arc::clone(&self.tracker),
            &self.config.dispatch,
            self.shutdown.clone(),
        );
        let span = info_span!("file_listener", path = %path);
        let task = run_dispatch_loop(channels, dispatcher)
            .instrument(span)
            .with_subscriber(dispatch);

        self.loop_handle = Some(runtime.spawn(task));
        self.watch_path = Some(path.to_owned());
        self.state.send_replace(ListenerState::Watching);

        info!(
            path = %path,
            recursive = mode.is_recursive(),
            max_concurrent_handlers = ?self.config.dispatch.max_concurrent_handlers,
            per_path_ordering = self.config.dispatch.per_path_ordering,
            "Filesystem listener started"
        );
        Ok(())
    }

    /// Closes the source and waits for every in-flight handler to finish.
    ///
    /// The wait happens even when closing the source fails. Calling `stop`
    /// again returns promptly, with the source's repeated-close error.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::Shutdown`] if closing the source failed. Takes
    ///   precedence over a drain timeout.
    /// - [`ListenerError::DrainTimeout`] if a drain timeout is configured and
    ///   handlers were still running when it expired. They keep running and
    ///   the listener moves to [`ListenerState::Stopped`] once they finish.
    pub async fn stop(&mut self) -> Result<(), ListenerError> {
        let dispatch = self.current_dispatch();
        self.stop_inner().with_subscriber(dispatch).await
    }

    /// Waits for `trigger` to be cancelled, then [`stop`](Self::stop)s.
    ///
    /// # Errors
    ///
    /// Same as [`stop`](Self::stop).
    pub async fn run_until_cancelled(
        &mut self,
        trigger: &CancellationToken,
    ) -> Result<(), ListenerError> {
        trigger.cancelled().await;
        self.stop().await
    }

    async fn stop_inner(&mut self) -> Result<(), ListenerError> {
        info!(
            path = ?self.watch_path,
            in_flight = self.tracker.live(),
            "Shutting down filesystem listener"
        );
        if matches!(self.state(), ListenerState::Idle | ListenerState::Watching) {
            self.state.send_replace(ListenerState::Draining);
        }
        self.shutdown.cancel();

        let closed = self.source.close();
        match &closed {
            Ok(()) => info!("Filesystem listener closed"),
            Err(error) => error!(error = %error, "Cannot close filesystem listener"),
        }

        // Left `Some` if the timeout fires before the loop exits.
        let mut loop_handle = self.loop_handle.take();
        let tracker = Arc::clone(&self.tracker);
        let drain = async {
            join_dispatch_loop(&mut loop_handle).await;
            info!(in_flight = tracker.live(), "Waiting for ongoing handlers to finish");
            tracker.wait_idle().await;
        };

        let drained = match self.config.shutdown.drain_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, drain)
                .await
                .map_err(|_| timeout),
            None => {
                drain.await;
                Ok(())
            }
        };

        let drain_result = match drained {
            Ok(()) => {
                self.state.send_replace(ListenerState::Stopped);
                info!(stats = ?self.tracker.snapshot(), "All ongoing handlers finished");
                Ok(())
            }
            Err(timeout) => {
                let remaining = self.tracker.live();
                warn!(
                    remaining,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Drain timeout expired, handlers keep running in the background"
                );
                self.finish_in_background(loop_handle);
                Err(ListenerError::DrainTimeout { remaining, timeout })
            }
        };

        closed.map_err(ListenerError::Shutdown)?;
        drain_result
    }

    /// Moves to `Stopped` once the dispatch loop and the handlers left behind
    /// by a drain timeout finish.
    fn finish_in_background(&self, mut loop_handle: Option<JoinHandle<()>>) {
        let tracker = Arc::clone(&self.tracker);
        let state = Arc::clone(&self.state);
        tokio::spawn(
            async move {
                join_dispatch_loop(&mut loop_handle).await;
                tracker.wait_idle().await;
                state.send_replace(ListenerState::Stopped);
                info!(stats = ?tracker.snapshot(), "All ongoing handlers finished");
            }
            .with_current_subscriber(),
        );
    }

    fn current_dispatch(&self) -> Dispatch {
        self.dispatch
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone))
    }
}

/// Waits for the dispatch loop to exit and clears the handle once it has.
async fn join_dispatch_loop(handle: &mut Option<JoinHandle<()>>) {
    if let Some(running) = handle.as_mut() {
        if let Err(error) = running.await {
            error!(error = %error, "Dispatch loop terminated abnormally");
        }
        *handle = None;
    }
}

/// Whether an event may be handled now.
enum Admission {
    /// No concurrency bound configured.
    Unbounded,
    /// A handler slot was acquired.
    Permit(OwnedSemaphorePermit),
    /// Every slot is busy and the policy is to drop.
    Rejected,
}

/// Resources held by one handler task.
///
/// Fields drop in declaration order, also when the handler panics: the next
/// turn on the path and the handler slot are released before the invocation
/// stops counting as live.
struct InFlight {
    turn: Option<PathTurn>,
    _permit: Option<OwnedSemaphorePermit>,
    guard: InvocationGuard,
}

/// State owned by the dispatch loop.
struct Dispatcher {
    handler: Arc<dyn EventHandler>,
    tracker: Arc<InvocationTracker>,
    limiter: Option<Arc<Semaphore>>,
    overload: OverloadPolicy,
    sequencer: Option<PathSequencer>,
    shutdown: CancellationToken,
    next_id: u64,
}

impl Dispatcher {
    fn new(
        handler: Arc<dyn EventHandler>,
        tracker: Arc<InvocationTracker>,
        config: &DispatchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            handler,
            tracker,
            limiter: config
                .max_concurrent_handlers
                .map(|max| Arc::new(Semaphore::new(max))),
            overload: config.overload_policy,
            sequencer: config.per_path_ordering.then(PathSequencer::new),
            shutdown,
            next_id: 0,
        }
    }

    async fn admit(&self, event: &FileEvent) -> Admission {
        let Some(limiter) = &self.limiter else {
            return Admission::Unbounded;
        };

        match self.overload {
            OverloadPolicy::Block => {
                if limiter.available_permits() == 0 {
                    debug!(event = %event, "All handler slots busy, waiting");
                }
                match Arc::clone(limiter).acquire_owned().await {
                    Ok(permit) => Admission::Permit(permit),
                    Err(_) => Admission::Rejected,
                }
            }
            OverloadPolicy::Drop => match Arc::clone(limiter).try_acquire_owned() {
                Ok(permit) => Admission::Permit(permit),
                Err(_) => Admission::Rejected,
            },
        }
    }

    /// Counts the event as in flight and spawns its handler task.
    async fn dispatch(&mut self, event: FileEvent) {
        let permit = match self.admit(&event).await {
            Admission::Unbounded => None,
            Admission::Permit(permit) => Some(permit),
            Admission::Rejected => {
                self.tracker.record_dropped();
                warn!(event = %event, policy = self.overload.label(), "All handler slots busy, dropping file event");
                return;
            }
        };

        self.next_id += 1;
        let id = self.next_id;
        let mut in_flight = InFlight {
            guard: InvocationTracker::begin(&self.tracker),
            turn: self
                .sequencer
                .as_mut()
                .map(|sequencer| sequencer.enqueue(&event.path)),
            _permit: permit,
        };
        info!(id, event = %event, "File event received");

        let handler = Arc::clone(&self.handler);
        let ctx = HandlerContext::new(id, self.shutdown.clone());
        let span = info_span!("handle", id);

        tokio::spawn(
            async move {
                if let Some(turn) = in_flight.turn.as_mut() {
                    turn.wait().await;
                }

                match handler.handle(&ctx, &event).await {
                    Ok(()) => info!(event = %event, "File event handled"),
                    Err(error) => {
                        in_flight.guard.mark_failed();
                        warn!(event = %event, error = %error, "File event handler failed");
                    }
                }

                drop(in_flight);
            }
            .instrument(span)
            .with_current_subscriber(),
        );
    }
}

/// Consumes the source's channels until either terminates.
async fn run_dispatch_loop(mut channels: SourceChannels, mut dispatcher: Dispatcher) {
    loop {
        tokio::select! {
            event = channels.events.recv() => match event {
                Some(event) => dispatcher.dispatch(event).await,
                None => break,
            },
            error = channels.errors.recv() => match error {
                Some(error) => error!(error = %error, "File listener event error"),
                None => break,
            },
        }
    }

    // Events the source delivered before closing are still handled.
    while let Ok(event) = channels.events.try_recv() {
        dispatcher.dispatch(event).await;
    }

    info!("File listener stopped listening");
}
