//! Hotserve CLI - serve a build output directory during development.
//!
//! The CLI treats a directory as the output of a watching bundler: a file
//! watcher stands in for the compiler, reporting a rebuild whenever the
//! directory changes, and the `hotserve` library serves the directory with
//! range and caching support while pushing build status to connected
//! clients.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line definition (clap)
//! - [`config`] - Layered configuration loading (figment)
//! - [`error`] - CLI error types and miette conversion
//! - [`logger`] - tracing subscriber setup
//! - [`watcher`] - Directory watcher implementing the build watcher contract
//! - [`commands`] - Command implementations

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod watcher;

// Re-export commonly used types
pub use config::HotserveConfig;
pub use error::{CliError, Result};
