//! The pluggable per-event unit of work.
//!
//! The listener calls [`EventHandler::handle`] once per received event, each
//! call in its own tokio task. Handlers may be slow; the listener imposes no
//! timeout and never cancels an invocation. A handler that wants to stop
//! early on shutdown can watch [`HandlerContext::shutdown`].
//!
//! # Examples
//!
//! ```
//! use fl_listener::{EventHandler, FileEvent, HandlerContext, HandlerError, HandlerResult};
//!
//! struct RejectEmpty;
//!
//! #[async_trait::async_trait]
//! impl EventHandler for RejectEmpty {
//!     async fn handle(&self, _ctx: &HandlerContext, event: &FileEvent) -> HandlerResult {
//!         if event.path.as_str().is_empty() {
//!             return Err(HandlerError::failed("empty path"));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::events::FileEvent;

/// Outcome of a single handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

/// Per-invocation context passed to a handler.
///
/// Carries an invocation id for log correlation and the listener's shutdown
/// token, which is cancelled when `stop` begins. Observing the token is
/// optional.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    invocation_id: u64,
    shutdown: CancellationToken,
}

impl HandlerContext {
    /// Creates a context for the given invocation.
    #[must_use]
    pub const fn new(invocation_id: u64, shutdown: CancellationToken) -> Self {
        Self {
            invocation_id,
            shutdown,
        }
    }

    /// Returns the listener-assigned invocation id (starting at 1).
    #[inline]
    #[must_use]
    pub const fn invocation_id(&self) -> u64 {
        self.invocation_id
    }

    /// Returns the listener's shutdown token.
    #[inline]
    #[must_use]
    pub const fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Returns `true` once the listener has begun stopping.
    #[inline]
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Application-defined work run for every file event.
///
/// Implementations must be cheap to share: the listener holds them behind an
/// `Arc` and calls `handle` concurrently from many tasks. A failure is
/// reported through the returned [`HandlerResult`]; the listener logs and
/// counts it.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Handles one event.
    async fn handle(&self, ctx: &HandlerContext, event: &FileEvent) -> HandlerResult;
}

/// Adapts an async closure into an [`EventHandler`].
///
/// The closure receives owned copies of the context and event.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use fl_listener::{EventHandler, FnHandler};
///
/// let handler: Arc<dyn EventHandler> = Arc::new(FnHandler::new(|_ctx, event| async move {
///     tracing::info!(event = %event, "Handled");
///     Ok(())
/// }));
/// # drop(handler);
/// ```
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    /// Wraps the closure.
    #[must_use]
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(HandlerContext, FileEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(HandlerContext, FileEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, ctx: &HandlerContext, event: &FileEvent) -> HandlerResult {
        (self.f)(ctx.clone(), event.clone()).await
    }
}
