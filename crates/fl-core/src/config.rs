//! Configuration structures for the file listener.
//!
//! This module provides configuration types for each stage of the listener:
//!
//! - [`WatchConfig`] - Event source settings (recursion, channel capacity)
//! - [`DispatchConfig`] - Handler fan-out settings (concurrency bound, ordering)
//! - [`ShutdownConfig`] - Drain behaviour when the listener stops
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`]. The defaults reproduce the
//! plain listener: recursive watching, unbounded fan-out, no per-path
//! ordering and an unlimited drain.

use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default capacity of the event and error channels between the source and
/// the dispatch loop.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// What the dispatch loop does with an event when every handler slot is busy.
///
/// Only consulted when [`DispatchConfig::max_concurrent_handlers`] is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverloadPolicy {
    /// Wait for a slot to free up before accepting the next event.
    ///
    /// Backpressure propagates to the event source.
    #[default]
    Block,
    /// Log the event and discard it without invoking the handler.
    Drop,
}

impl OverloadPolicy {
    /// Returns a lowercase label suitable for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Drop => "drop",
        }
    }
}

/// Configuration for the event source.
///
/// # Examples
///
/// ```
/// use fl_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert!(config.recursive);
/// assert_eq!(config.channel_capacity, 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Whether to watch subdirectories recursively.
    pub recursive: bool,

    /// Capacity of the event and error channels.
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Configuration for handler dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum number of handler invocations running at once.
    ///
    /// `None` means unbounded fan-out: one invocation per event with no cap.
    pub max_concurrent_handlers: Option<usize>,

    /// Behaviour when `max_concurrent_handlers` invocations are already running.
    pub overload_policy: OverloadPolicy,

    /// Run invocations for the same path one at a time, in arrival order.
    pub per_path_ordering: bool,
}

/// Configuration for listener shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long `stop` waits for in-flight handlers, in milliseconds.
    ///
    /// `None` waits until every handler has returned. When set, `stop`
    /// returns an error after the timeout while the remaining handlers
    /// keep running in the background.
    pub drain_timeout_ms: Option<u64>,
}

impl ShutdownConfig {
    /// Returns the drain timeout as a [`Duration`], if any.
    #[inline]
    #[must_use]
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }
}

/// Root configuration for the file listener.
///
/// # Examples
///
/// ```
/// use fl_core::Config;
///
/// let config = Config::default();
/// assert!(config.validate().is_ok());
///
/// let json = serde_json::to_string_pretty(&config).unwrap();
/// assert!(json.contains("channel_capacity"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event source configuration.
    pub watch: WatchConfig,

    /// Handler dispatch configuration.
    pub dispatch: DispatchConfig,

    /// Shutdown configuration.
    pub shutdown: ShutdownConfig,
}

impl Config {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist,
    /// [`ConfigError::Io`] or [`ConfigError::Parse`] if it cannot be read or
    /// parsed, and [`ConfigError::InvalidOption`] if validation fails.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_owned()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every option holds a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first bad option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.channel_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "watch.channel_capacity",
                "must be greater than zero",
            ));
        }
        if self.dispatch.max_concurrent_handlers == Some(0) {
            return Err(ConfigError::invalid_option(
                "dispatch.max_concurrent_handlers",
                "must be greater than zero when set",
            ));
        }
        if self.shutdown.drain_timeout_ms == Some(0) {
            return Err(ConfigError::invalid_option(
                "shutdown.drain_timeout_ms",
                "must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert!(config.recursive);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_dispatch_config_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_concurrent_handlers, None);
        assert_eq!(config.overload_policy, OverloadPolicy::Block);
        assert!(!config.per_path_ordering);
    }

    #[test]
    fn test_shutdown_config_drain_timeout() {
        assert_eq!(ShutdownConfig::default().drain_timeout(), None);

        let config = ShutdownConfig {
            drain_timeout_ms: Some(1500),
        };
        assert_eq!(config.drain_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"dispatch": {"max_concurrent_handlers": 4, "overload_policy": "drop"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.dispatch.max_concurrent_handlers, Some(4));
        assert_eq!(config.dispatch.overload_policy, OverloadPolicy::Drop);
        // Other fields should have defaults
        assert!(config.watch.recursive);
        assert_eq!(config.shutdown.drain_timeout_ms, None);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_overload_policy_serialization() {
        assert_eq!(
            serde_json::to_string(&OverloadPolicy::Block).unwrap(),
            r#""block""#
        );
        assert_eq!(
            serde_json::to_string(&OverloadPolicy::Drop).unwrap(),
            r#""drop""#
        );
        assert_eq!(OverloadPolicy::Drop.label(), "drop");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.watch.channel_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { ref option, .. }) if option == "watch.channel_capacity"
        ));

        let mut config = Config::default();
        config.dispatch.max_concurrent_handlers = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.shutdown.drain_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("listener.json")).unwrap();
        std::fs::write(&path, r#"{"watch": {"recursive": false}}"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert!(!config.watch.recursive);
        assert_eq!(config.watch.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_from_json_file_missing() {
        let result = Config::from_json_file(Utf8Path::new("/nonexistent/listener.json"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_from_json_file_invalid_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("listener.json")).unwrap();
        std::fs::write(&path, r#"{"watch": {"channel_capacity": 0}}"#).unwrap();

        assert!(matches!(
            Config::from_json_file(&path),
            Err(ConfigError::InvalidOption { .. })
        ));
    }
}
