//! Configuration and shared error types for the file-listener workspace.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`Config`] and its sections ([`WatchConfig`], [`DispatchConfig`],
//!   [`ShutdownConfig`])
//! - [`OverloadPolicy`] for bounded handler concurrency
//! - [`ConfigError`] for loading and validation failures

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{Config, DispatchConfig, OverloadPolicy, ShutdownConfig, WatchConfig};
pub use error::ConfigError;
