//! Config Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration could not be read, parsed or validated.
    #[display("invalid configuration: {_0}")]
    Configuration(#[error(not(source))] String),
    /// The configured backend name is not one of `local`, `s3` or `gcs`.
    #[display("unknown backend `{_0}`")]
    UnknownBackend(#[error(not(source))] String),
    /// The selected backend could not be constructed.
    #[display("cannot connect to {_0} backend")]
    Connection(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}
