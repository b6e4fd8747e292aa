//! Error types for the development server.
//!
//! The hierarchy mirrors how failures surface:
//! - **Request errors** (`HttpError`) become a status code for one response
//! - **Filesystem errors** (`FsError`) abort one in-flight body or stat
//! - **Configuration errors** (`ConfigError`) are reported at startup
//!
//! Everything converts into the top-level [`Error`] via `#[from]`.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// A request could not be answered with a success response
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Output filesystem failures
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors from the real disk
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compiler or transport level failures
    #[error("Server error: {0}")]
    Server(String),
}

/// Errors that terminate a single request with a client-facing status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// Malformed URI encoding, NUL byte in the path or malformed `Range`
    #[error("Bad request: {0}")]
    BadRequest(&'static str),

    /// `If-Match` / `If-Unmodified-Since` precondition did not hold
    #[error("Precondition failed")]
    PreconditionFailed,

    /// No requested range overlaps the resource
    #[error("Range not satisfiable for resource of {size} bytes")]
    RangeNotSatisfiable {
        /// Current size of the resource, advertised in `Content-Range`
        size: u64,
    },
}

impl HttpError {
    /// Status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            HttpError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (status, status.canonical_reason().unwrap_or_default()).into_response();

        if let HttpError::RangeNotSatisfiable { size } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

/// Output filesystem errors.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path does not exist
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Underlying I/O failure
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path the operation was performed on
        path: PathBuf,
        /// Original error
        #[source]
        source: std::io::Error,
    },

    /// File ended before the requested range was fully read
    #[error("Unexpected end of file in {} at offset {offset}", .path.display())]
    UnexpectedEof {
        /// File being read
        path: PathBuf,
        /// Offset at which the read returned no data
        offset: u64,
    },
}

impl FsError {
    /// Wrap an `std::io::Error` with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            FsError::NotFound(path)
        } else {
            FsError::Io { path, source }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },
}

/// Result type alias using [`Error`] as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_status_codes() {
        assert_eq!(HttpError::BadRequest("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            HttpError::PreconditionFailed.status(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            HttpError::RangeNotSatisfiable { size: 10 }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
    }

    #[test]
    fn test_range_not_satisfiable_sets_content_range() {
        let response = HttpError::RangeNotSatisfiable { size: 1234 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1234"
        );
    }

    #[test]
    fn test_fs_error_io_maps_not_found() {
        let err = FsError::io(
            "/out/app.js",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, FsError::NotFound(_)));

        let err = FsError::io(
            "/out/app.js",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/out/app.js"));
    }

    #[test]
    fn test_config_error_has_hint() {
        let err = ConfigError::InvalidValue {
            field: "hot.path".to_string(),
            value: "".to_string(),
            hint: "Use a path such as /hot".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid value for 'hot.path'"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_error_from_conversions() {
        let err: Error = HttpError::PreconditionFailed.into();
        assert!(matches!(err, Error::Http(_)));

        let err: Error = FsError::NotFound(PathBuf::from("a")).into();
        assert!(matches!(err, Error::Fs(_)));
    }
}
