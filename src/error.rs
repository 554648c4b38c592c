//! Command Error Types
//!
//! Library errors are kept as child frames; these kinds only say which step
//! of a command failed.

use derive_more::{Display, Error};

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Loading the configuration or connecting to the backend failed.
    #[display("cannot set up storage backend")]
    Setup,
    /// A configured value is out of range for the scanner.
    #[display("invalid setting: {_0}")]
    InvalidSetting(#[error(not(source))] String),
    /// The tenants of a backend could not be listed.
    #[display("cannot list tenants")]
    Tenants,
    /// The blocks of a tenant could not be scanned.
    #[display("cannot scan tenant `{_0}`")]
    Scan(#[error(not(source))] String),
    /// The trace endpoint could not be reached or answered garbage.
    #[display("trace query failed: {_0}")]
    Query(#[error(not(source))] String),
    /// The trace endpoint answered with a non-success status.
    #[display("trace endpoint returned HTTP {_0}")]
    QueryStatus(#[error(not(source))] u16),
    /// Writing the output failed.
    #[display("cannot write output")]
    Output,
}
