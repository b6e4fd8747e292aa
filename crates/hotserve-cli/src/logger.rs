//! Logging setup for the hotserve CLI.
//!
//! Installs a `tracing` subscriber with an [`EnvFilter`] and a compact
//! formatter. `RUST_LOG` overrides the default filter unless `--verbose` or
//! `--quiet` is given.
//!
//! # Example
//!
//! ```rust,no_run
//! use hotserve_cli::logger::init_logger;
//!
//! init_logger(false, false, false);
//! tracing::info!("serving");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither a flag nor `RUST_LOG` says otherwise.
pub const DEFAULT_FILTER: &str = "hotserve=info,hotserve_cli=info";

/// Initialize the global tracing subscriber.
///
/// Call once, before anything logs.
///
/// # Verbosity Levels
///
/// 1. `--verbose`: debug for hotserve crates
/// 2. `--quiet`: errors only
/// 3. `RUST_LOG`: custom filter
/// 4. Default: [`DEFAULT_FILTER`]
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Initialize the global tracing subscriber with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("hotserve=debug,hotserve_cli=debug")
    } else if quiet {
        EnvFilter::new("hotserve=error,hotserve_cli=error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
