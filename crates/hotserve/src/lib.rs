//! Hotserve - development server layer for bundler output.
//!
//! This crate sits between an HTTP server and a watching bundler. It serves
//! the bundler's output with correct caching and byte-range semantics, and
//! pushes build status events to connected clients over a websocket.
//!
//! # Architecture
//!
//! - [`http`] - Range parsing, conditional request negotiation and multipart framing
//! - [`service`] - Per-output-directory file service and the range body stream
//! - [`router`] - Maps build targets to file services, cached per build generation
//! - [`build`] - Build watcher contract, status tracker and write-to-disk support
//! - [`hot`] - Live connection hub and the status socket wire protocol
//! - [`fs`] - Output filesystem abstraction (native and in-memory)
//! - [`middleware`] - axum middleware wiring everything into a router
//! - [`server`] - [`DevServer`] facade owning one server/build pairing
//!
//! # Example
//!
//! ```rust,ignore
//! use hotserve::{DevServer, DevServerOptions};
//! use std::sync::Arc;
//!
//! let server = DevServer::new(compiler, DevServerOptions::default())?;
//! let app = server.layer(axum::Router::new().fallback(not_found));
//! axum::serve(listener, app).await?;
//! ```

pub mod build;
pub mod config;
pub mod error;
pub mod fs;
pub mod hot;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use build::{BuildEvent, BuildResult, BuildStatusTracker, Compiler, Stats, TargetConfig};
pub use config::DevServerConfig;
pub use error::{ConfigError, Error, FsError, HttpError, Result};
pub use fs::{FileStat, MemoryFs, NativeFs, OutputFileSystem};
pub use hot::{ConnectionHub, HotOptions, Message};
pub use router::OutputRouter;
pub use server::{DevServer, DevServerOptions};
pub use service::{FileService, ServiceOptions};

/// Name used to prefix log output and identify this integration to compilers.
pub const PLUGIN_NAME: &str = "hotserve";
