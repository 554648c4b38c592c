//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object does not exist
    #[display("object not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (S3/GCS connections, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend rejected its own configuration before any request was made
    #[display("invalid backend configuration: {_0}")]
    InvalidConfig(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// Stored metadata could not be decoded
    #[display("invalid block metadata: {}", _0.display())]
    InvalidData(#[error(not(source))] PathBuf),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::BackendError(_))
    }

    /// Returns `true` for the "nothing there" outcome, which readers treat as
    /// an absent value rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::NotFound(Path::new("single-tenant/meta.json").to_path_buf()).to_string(),
            "object not found: single-tenant/meta.json"
        );
        assert_eq!(ErrorKind::Network("connection reset".to_string()).to_string(), "network error: connection reset");
    }

    #[test]
    fn error_kind_classification() {
        assert!(ErrorKind::Network(String::new()).is_retryable());
        assert!(!ErrorKind::InvalidData(PathBuf::new()).is_retryable());
        assert!(ErrorKind::NotFound(PathBuf::new()).is_not_found());
        assert!(!ErrorKind::PermissionDenied(PathBuf::new()).is_not_found());
    }
}
