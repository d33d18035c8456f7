//! CLI entry point for the file-listener service.
//!
//! Watches a directory and runs a simulated unit of work for every file
//! event. On SIGINT, SIGTERM or SIGHUP the listener stops accepting events
//! and waits for every running handler before the process exits.
//!
//! # Usage
//!
//! ```bash
//! file-listener [OPTIONS] [PATH]
//!
//! # Watch the current directory, 15 s of simulated work per event
//! file-listener
//!
//! # At most 4 concurrent handlers, drop events when all 4 are busy
//! file-listener ./data --max-concurrent 4 --overload-policy drop
//!
//! # Load settings from a file, give handlers 30 s to finish on shutdown
//! file-listener --config listener.json --drain-timeout-ms 30000
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use color_eyre::eyre::WrapErr;
use fl_core::{Config, OverloadPolicy};
use fl_listener::{
    EventHandler, FileEvent, HandlerContext, HandlerResult, Listener, NotifySource,
    TrackerSnapshot,
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watches a directory and handles every file event concurrently.
///
/// Shutdown waits for all in-flight handlers to finish.
#[derive(Debug, Parser)]
#[command(name = "file-listener", version, about, long_about = None)]
struct Cli {
    /// Directory to watch.
    #[arg(default_value = ".", env = "FILE_LISTENER_PATH")]
    path: Utf8PathBuf,

    /// JSON configuration file. Flags override its values.
    #[arg(short, long, env = "FILE_LISTENER_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Watch only the top-level directory, not its subdirectories.
    #[arg(long)]
    flat: bool,

    /// Maximum number of handlers running at once (unbounded if unset).
    #[arg(long, env = "FILE_LISTENER_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// What to do with an event when every handler slot is busy.
    #[arg(long, value_enum, env = "FILE_LISTENER_OVERLOAD_POLICY")]
    overload_policy: Option<PolicyArg>,

    /// Run handlers for the same path one at a time, in arrival order.
    #[arg(long, env = "FILE_LISTENER_PER_PATH_ORDERING")]
    per_path_ordering: bool,

    /// Give up waiting for handlers after this many milliseconds on shutdown.
    #[arg(long, env = "FILE_LISTENER_DRAIN_TIMEOUT_MS")]
    drain_timeout_ms: Option<u64>,

    /// Seconds of simulated work per event.
    #[arg(long, default_value_t = 15, env = "FILE_LISTENER_HANDLER_DELAY_SECS")]
    handler_delay_secs: u64,

    /// Print the final invocation counters as JSON on exit.
    #[arg(long)]
    stats_json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

/// Overload policy as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Wait for a free slot.
    Block,
    /// Discard the event.
    Drop,
}

impl From<PolicyArg> for OverloadPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Block => Self::Block,
            PolicyArg::Drop => Self::Drop,
        }
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Builds the tracing dispatcher and installs it as the global default.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// `notify` is filtered to `warn` level.
///
/// The returned dispatcher is also handed to the listener so its tasks log
/// through the same subscriber.
fn init_tracing(verbose: bool, no_color: bool) -> color_eyre::Result<Dispatch> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    let subscriber = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter);

    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_global_default(dispatch.clone())
        .wrap_err("Failed to install tracing subscriber")?;
    Ok(dispatch)
}

/// Builds a [`Config`] from the optional config file and CLI overrides.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded or the resulting
/// configuration is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .wrap_err_with(|| format!("Failed to load config from {path}"))?,
        None => Config::default(),
    };

    if cli.flat {
        config.watch.recursive = false;
    }
    if let Some(max) = cli.max_concurrent {
        config.dispatch.max_concurrent_handlers = Some(max);
    }
    if let Some(policy) = cli.overload_policy {
        config.dispatch.overload_policy = policy.into();
    }
    if cli.per_path_ordering {
        config.dispatch.per_path_ordering = true;
    }
    if let Some(ms) = cli.drain_timeout_ms {
        config.shutdown.drain_timeout_ms = Some(ms);
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// HANDLER
// =============================================================================

/// Stands in for real per-file work by sleeping a fixed delay.
#[derive(Debug, Clone, Copy)]
struct SimulatedWorkHandler {
    delay: Duration,
}

impl SimulatedWorkHandler {
    const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl EventHandler for SimulatedWorkHandler {
    async fn handle(&self, ctx: &HandlerContext, event: &FileEvent) -> HandlerResult {
        debug!(
            id = ctx.invocation_id(),
            event = %event,
            delay_secs = self.delay.as_secs(),
            "Simulating work"
        );
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

// =============================================================================
// SIGNALS
// =============================================================================

/// Process signals that trigger a graceful shutdown.
#[cfg(unix)]
struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Registers SIGINT, SIGTERM and SIGHUP handlers.
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Waits for the first shutdown signal and returns its name.
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }
}

/// Process signals that trigger a graceful shutdown.
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "Cannot listen for ctrl-c, shutting down");
        }
        "ctrl-c"
    }
}

// =============================================================================
// RUN
// =============================================================================

/// Starts the listener and blocks until a shutdown signal has been handled.
///
/// # Errors
///
/// Returns an error if signals cannot be registered, the path cannot be
/// watched, or shutdown fails.
async fn run(cli: &Cli, config: &Config, dispatch: Dispatch) -> color_eyre::Result<TrackerSnapshot> {
    let mut signals = ShutdownSignals::install().wrap_err("Failed to register signal handlers")?;

    let source = NotifySource::new(&config.watch)?;
    let handler: Arc<dyn EventHandler> = Arc::new(SimulatedWorkHandler::new(
        Duration::from_secs(cli.handler_delay_secs),
    ));

    let mut listener = Listener::with_config(source, handler, config).with_dispatch(dispatch);
    if let Err(error) = listener.start(&cli.path) {
        if let Some(path) = error.path() {
            tracing::error!(path = %path, "Cannot watch path");
        }
        return Err(error.into());
    }

    let trigger = CancellationToken::new();
    let signal_trigger = trigger.clone();
    tokio::spawn(async move {
        let name = signals.recv().await;
        info!(signal = name, "Received shutdown signal");
        signal_trigger.cancel();
    });

    listener.run_until_cancelled(&trigger).await?;
    Ok(listener.stats())
}

/// Writes the final counters to stdout as JSON.
fn print_stats_json(stats: &TrackerSnapshot) -> color_eyre::Result<()> {
    let json = serde_json::to_string_pretty(stats).wrap_err("Failed to serialize stats")?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    let dispatch = init_tracing(cli.verbose, cli.no_color)?;

    // 4. Merge config file and flags
    let config = build_config(&cli)?;

    // 5. Listen until signalled
    let stats = run(&cli, &config, dispatch).await?;
    info!(
        handled = stats.completed,
        failed = stats.failed,
        dropped = stats.dropped,
        peak = stats.peak,
        "Exiting"
    );

    if cli.stats_json {
        print_stats_json(&stats)?;
    }
    Ok(())
}
