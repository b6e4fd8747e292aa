//! Command-line interface definition.
//!
//! - `hotserve serve <DIR>` - serve a directory as live build output

use clap::{Args, Parser, Subcommand};
use hotserve::build::StatsPreset;
use std::path::PathBuf;

/// Hotserve - development server for bundler output
#[derive(Parser, Debug)]
#[command(
    name = "hotserve",
    version,
    about = "Development server for bundler output",
    long_about = "Hotserve serves a build output directory with byte-range and caching\n\
                  support, and pushes build status to connected browsers over a websocket\n\
                  whenever the directory changes."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (defaults to ./hotserve.json when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a directory as build output
    ///
    /// Every change inside the directory is reported to connected clients
    /// as a rebuild.
    Serve(ServeArgs),
}

/// Arguments for the serve command
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Directory to serve
    #[arg(default_value = ".", value_name = "DIR")]
    pub dir: PathBuf,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// URL prefix the directory is served under
    #[arg(long, value_name = "PATH")]
    pub public_path: Option<String>,

    /// Websocket path for build status
    #[arg(long, value_name = "PATH")]
    pub socket_path: Option<String>,

    /// Quiet period after a change before the rebuild is reported
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Stats preset (none, errors-only, minimal, normal, verbose)
    #[arg(long, value_name = "PRESET")]
    pub stats: Option<StatsPreset>,

    /// Disable the build status socket
    #[arg(long)]
    pub no_hot: bool,

    /// Reload instead of applying updates in place
    #[arg(long, conflicts_with = "no_hot")]
    pub no_hmr: bool,

    /// Do not report build progress
    #[arg(long, conflicts_with = "no_hot")]
    pub no_progress: bool,

    /// Do not send ETag headers
    #[arg(long)]
    pub no_etag: bool,

    /// Do not send Last-Modified headers
    #[arg(long)]
    pub no_last_modified: bool,

    /// Ignore Range headers and always send whole files
    #[arg(long)]
    pub no_ranges: bool,

    /// Extra response header, as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

/// Parse a `Name: value` header argument.
pub fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got `{s}`"))?;

    let name = name.trim();
    if name.is_empty() {
        return Err("header name cannot be empty".to_string());
    }

    Ok((name.to_string(), value.trim().to_string()))
}
