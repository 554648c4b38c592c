//! In-memory storage backend for testing.

use super::NameStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. Paths
/// registered with [`fail_under()`](Self::fail_under) answer every request
/// with a [`Network`](ErrorKind::Network) error, which is how tests simulate
/// an unreachable bucket or a flaky read.
///
/// # Examples
///
/// ```
/// use blockscope_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_objects([
///     ("tenant/0b7d7f6e-8a8b-4c0e-9a57-1d2c3b4a5f60/meta.json", "{}"),
/// ]);
/// assert_eq!(backend.read(Path::new("tenant/0b7d7f6e-8a8b-4c0e-9a57-1d2c3b4a5f60/meta.json")).await?, b"{}");
/// assert_eq!(backend.list(None).await?, vec!["tenant".to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, Vec<u8>>>,
    failing: Vec<PathBuf>,
}

impl MockBackend {
    /// Create a mock backend holding `objects`, keyed by relative path.
    ///
    /// Panics on a path that fails validation.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in objects {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // Fixtures are written by hand; a bad one is a broken test.
                panic!("MockBackend::with_objects: invalid path {}", path.display());
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            failing: Vec::new(),
        }
    }

    /// Make every request for `prefix` (or anything beneath it) fail with a
    /// network error. An empty prefix fails listing the root.
    pub fn fail_under(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.failing.push(prefix.into());
        self
    }

    /// Add an object after construction.
    pub async fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) -> Result<()> {
        let path = validate_path(path.into())?;
        self.storage.write().await.insert(path, data.into());
        Ok(())
    }

    fn check_reachable(&self, path: &Path) -> Result<()> {
        if self.failing.iter().any(|prefix| path.starts_with(prefix)) {
            exn::bail!(ErrorKind::Network(format!("simulated failure reaching {}", path.display())));
        }
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let objects: [(&str, &str); 0] = [];
        Self::with_objects(objects)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> NameStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx.unwrap_or_default(),
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        if let Err(e) = self.check_reachable(&validated_prefix) {
            return Box::pin(futures::stream::once(async { Err(e) }));
        }

        Box::pin(stream! {
            // Snapshot matching children under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let children: BTreeSet<String> = {
                let guard = self.storage.read().await;
                guard
                    .keys()
                    .filter_map(|path| path.strip_prefix(&validated_prefix).ok())
                    .filter_map(|rest| {
                        let mut components = rest.components();
                        let child = components.next()?;
                        // Only directory-like children: something must follow.
                        components.next()?;
                        child.as_os_str().to_str().map(str::to_string)
                    })
                    .collect()
            };
            for child in children {
                yield Ok(child);
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        self.check_reachable(&path)?;
        let data = self.storage.read().await.get(&path).cloned();
        data.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read() {
        let backend = MockBackend::with_objects([("t/b/meta.json", "hello")]);
        assert_eq!(backend.read(Path::new("t/b/meta.json")).await.unwrap(), b"hello");
        let err = backend.read(Path::new("t/b/missing.json")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_children() {
        let backend = MockBackend::with_objects([
            ("t1/b1/meta.json", "a"),
            ("t1/b1/data", "a"),
            ("t1/b2/meta.compacted.json", "b"),
            ("t1/index", "not a directory"),
            ("t2/b3/meta.json", "c"),
        ]);
        assert_eq!(backend.list(None).await.unwrap(), vec!["t1", "t2"]);
        assert_eq!(backend.list(Some(Path::new("t1"))).await.unwrap(), vec!["b1", "b2"]);
        assert!(backend.list(Some(Path::new("t3"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failures() {
        let backend = MockBackend::with_objects([("t1/b1/meta.json", "a"), ("t2/b2/meta.json", "b")]).fail_under("t1");
        let err = backend.read(Path::new("t1/b1/meta.json")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network(_)));
        assert!(backend.list(Some(Path::new("t1"))).await.is_err());
        assert!(backend.read(Path::new("t2/b2/meta.json")).await.is_ok());
        // The root itself stays reachable.
        assert_eq!(backend.list(None).await.unwrap(), vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_unreachable_root() {
        let backend = MockBackend::default().fail_under("");
        assert!(backend.list(None).await.is_err());
    }

    #[tokio::test]
    async fn test_insert() {
        let backend = MockBackend::default();
        backend.insert("t/b/meta.json", "x").await.unwrap();
        assert_eq!(backend.read(Path::new("t/b/meta.json")).await.unwrap(), b"x");
        assert!(backend.insert("../escape", "bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_objects_panics_on_bad_path() {
        MockBackend::with_objects([("../escape", "bad")]);
    }
}
