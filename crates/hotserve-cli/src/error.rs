//! Error handling for the hotserve CLI.
//!
//! [`CliError`] wraps the library's errors together with the failures that
//! only the binary can hit (binding a port, watching a directory). `main`
//! turns it into a [`miette::Report`] through [`cli_error_to_miette`].

use std::path::PathBuf;
use thiserror::Error;

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration file, environment or flags
    #[error("Configuration error: {0}")]
    Config(#[from] hotserve::ConfigError),

    /// The dev server failed to start
    #[error("Dev server error: {0}")]
    DevServer(#[from] hotserve::Error),

    /// The directory to serve does not exist
    #[error("Directory not found: {}\n\nHint: Pass the build output directory, e.g. `hotserve serve dist`", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Binding or serving the HTTP listener failed
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors from file system operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// Convert a [`CliError`] into a miette report for display.
pub fn cli_error_to_miette(err: CliError) -> miette::Report {
    match err {
        CliError::Config(e) => miette::miette!("Configuration error: {}", e),
        CliError::DevServer(hotserve::Error::Config(e)) => {
            miette::miette!("Configuration error: {}", e)
        }
        _ => miette::miette!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_not_found_has_hint() {
        let err = CliError::DirectoryNotFound(PathBuf::from("missing"));
        let message = err.to_string();
        assert!(message.contains("missing"));
        assert!(message.contains("Hint:"));
    }

    #[test]
    fn test_config_errors_are_reported_as_configuration() {
        let err = CliError::DevServer(hotserve::Error::Config(hotserve::ConfigError::InvalidValue {
            field: "port".to_string(),
            value: "x".to_string(),
            hint: "Use a number".to_string(),
        }));
        let report = cli_error_to_miette(err);
        assert!(report.to_string().starts_with("Configuration error:"));
    }
}
