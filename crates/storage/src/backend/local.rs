//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! Blocks are read from a configured directory using `tokio::fs` for async I/O.

use crate::backend::NameStream;
use crate::error::{ErrorKind, Result};
use crate::{StorageBackend, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

/// Local filesystem storage backend.
///
/// Reads blocks from a directory on the local filesystem. All paths are
/// relative to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use blockscope_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/var/tempo/traces")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    /// Root directory holding one directory per tenant
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or if it exists but is
    /// not a directory. A root that doesn't exist yet is accepted (and lists
    /// as empty); this backend never creates anything.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() && !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    /// Get the absolute path for a relative storage path.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Resolve one directory entry to a child name, or `None` for anything
    /// that isn't a directory (stray files, broken symlinks).
    async fn child_dir_name(entry: DirEntry) -> Result<Option<String>> {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &path))?;
        if !file_type.is_dir() {
            // Symlinked directories are followed, everything else is skipped.
            let followed = fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false);
            if !followed {
                return Ok(None);
            }
        }
        match entry.file_name().into_string() {
            Ok(name) => Ok(Some(name)),
            Err(raw) => {
                tracing::debug!(path = %path.display(), name = ?raw, "Skipping directory with a non UTF-8 name");
                Ok(None)
            },
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> NameStream<'a> {
        let dir = match prefix.map(|pfx| self.absolute_path(pfx)).transpose() {
            Ok(Some(dir)) => dir,
            Ok(None) => self.root.clone(),
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };

        Box::pin(stream! {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // To stay consistent with object stores, asking for the
                // children of a directory that doesn't exist results in an
                // empty list not an error.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
                Err(err) => {
                    yield Err(exn::Exn::from(Self::map_io_error(err, &dir)));
                    return;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(exn::Exn::from(Self::map_io_error(e, &dir)));
                        return;
                    },
                };
                match Self::child_dir_name(entry).await {
                    Ok(Some(name)) => yield Ok(name),
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}
