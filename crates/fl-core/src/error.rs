//! Error types for the fl-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration-related errors.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use fl_core::ConfigError;
///
/// let error = ConfigError::invalid_option("watch.channel_capacity", "must be greater than zero");
/// assert!(error.to_string().contains("channel_capacity"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The dotted name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    NotFound(Utf8PathBuf),

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::invalid_option("dispatch.max_concurrent_handlers", "must be positive");
        let msg = error.to_string();
        assert!(msg.contains("dispatch.max_concurrent_handlers"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_not_found_display() {
        let error = ConfigError::NotFound(Utf8PathBuf::from("/etc/file-listener.json"));
        assert_eq!(
            error.to_string(),
            "configuration file not found: /etc/file-listener.json"
        );
    }

    #[test]
    fn test_parse_error_from_serde() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error = ConfigError::from(parse);
        assert!(error.to_string().starts_with("failed to parse configuration"));
    }
}
