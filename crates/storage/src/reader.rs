//! Block metadata reader.
//!
//! Turns the object-level [`StorageBackend`](crate::StorageBackend) into the
//! block-level questions a scan asks: which tenants exist, which blocks a
//! tenant has, and what a block's metadata says.

use crate::BackendHandle;
use crate::error::Result;
use crate::models::{BlockId, BlockMeta, CompactedBlockMeta};
use crate::path::{MetaObject, meta_path, tenant_dir};
use futures::TryStreamExt;
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;

/// Block-level view over a storage backend. Cheap to clone.
#[derive(Clone)]
pub struct BlockReader {
    backend: BackendHandle,
}
impl BlockReader {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    /// Name of the underlying backend.
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// All tenants with at least one block directory, sorted.
    pub async fn tenants(&self) -> Result<Vec<String>> {
        let mut tenants = self.backend.list(None).await?;
        tenants.sort();
        Ok(tenants)
    }

    /// Identifiers of every block stored for `tenant`, sorted.
    ///
    /// Directory names that aren't block identifiers (index files, leftovers
    /// of other tools) are skipped. An unknown tenant has no blocks.
    #[instrument(skip(self), fields(backend = self.name()))]
    pub async fn blocks(&self, tenant: &str) -> Result<Vec<BlockId>> {
        let dir = tenant_dir(tenant)?;
        let mut blocks: Vec<BlockId> = self
            .backend
            .list_stream(Some(&dir))
            .try_filter_map(|name| async move {
                match Uuid::parse_str(&name) {
                    Ok(id) => Ok(Some(id)),
                    Err(_) => {
                        tracing::debug!(tenant, entry = %name, "Skipping entry that is not a block id");
                        Ok(None)
                    },
                }
            })
            .try_collect()
            .await?;
        blocks.sort();
        Ok(blocks)
    }

    /// Metadata of an active block, or `None` if the block has no
    /// `meta.json` (compacted or never existed).
    pub async fn block_meta(&self, tenant: &str, id: &BlockId) -> Result<Option<BlockMeta>> {
        let path = meta_path(tenant, id, MetaObject::Active)?;
        self.read_optional(&path).await?.map(|bytes| BlockMeta::from_json(&bytes, &path)).transpose()
    }

    /// Metadata of a compacted block, or `None` if the block has no
    /// `meta.compacted.json`.
    pub async fn compacted_block_meta(&self, tenant: &str, id: &BlockId) -> Result<Option<CompactedBlockMeta>> {
        let path = meta_path(tenant, id, MetaObject::Compacted)?;
        self.read_optional(&path).await?.map(|bytes| CompactedBlockMeta::from_json(&bytes, &path)).transpose()
    }

    /// Read an object, treating "not found" as an absent value.
    async fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match self.backend.read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
