//! Scan Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Storage failures are kept as child
//! frames of these kinds.

use derive_more::{Display, Error};
use std::time::Duration;
use uuid::Uuid;

/// A scan error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a scan failure.
///
/// ### Fatal
/// - [`ErrorKind::Enumeration`]: nothing was scanned.
/// - [`ErrorKind::InvalidWindow`]: rejected before scanning.
///
/// ### Per block
/// - [`ErrorKind::Fetch`]
/// - [`ErrorKind::TaskFailed`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Listing the blocks of a tenant failed.
    #[display("cannot enumerate blocks of tenant `{_0}`")]
    Enumeration(#[error(not(source))] String),
    /// Reading or decoding the metadata of one block failed.
    #[display("cannot fetch metadata of block {_0}")]
    Fetch(#[error(not(source))] Uuid),
    /// The task fetching one block panicked or was cancelled.
    #[display("fetch task for block {_0} did not complete")]
    TaskFailed(#[error(not(source))] Uuid),
    /// Window durations must be at least one whole second.
    #[display("invalid window duration {_0:?}: must be at least one second")]
    InvalidWindow(#[error(not(source))] Duration),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Enumeration(_) | Self::Fetch(_))
    }
}
