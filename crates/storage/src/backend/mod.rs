//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! read-only interface over the places blocks are stored (local filesystem,
//! S3-compatible services, GCS-compatible services).

#[cfg(feature = "gcs")]
mod gcs;
mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "gcs")]
pub use self::gcs::{GcsBackend, GcsOptions};
pub use self::local::LocalBackend;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::{S3Backend, S3Options};
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type NameStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Unified read-only interface for storage backends.
///
/// Object stores have no real directories, so "listing" here means listing
/// the distinct next key segment below a prefix: the tenants at the root,
/// the block ids below a tenant. That's all block discovery needs.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```no_run
/// use blockscope_storage::{backend::StorageBackend, error::Result};
///
/// async fn tenant_count(backend: &dyn StorageBackend) -> Result<usize> {
///     Ok(backend.list(None).await?.len())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List the child names directly below an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<String>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream the child names directly below an optional prefix.
    ///
    /// Only "directory-like" children are yielded (names that have further
    /// keys beneath them); plain objects at the prefix level are skipped.
    /// A prefix that doesn't exist yields an empty stream rather than an
    /// error, matching how object stores behave. Order is unspecified.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> NameStream<'a>;

    /// Read object contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
}
