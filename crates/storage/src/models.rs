//! Block metadata models.
//!
//! These mirror the JSON documents written next to every block: `meta.json`
//! for a block that is still the primary source for its time range, and
//! `meta.compacted.json` for a block whose data has been merged into a newer
//! block but whose metadata is kept around for bookkeeping.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::Path;
use time::OffsetDateTime;
use uuid::Uuid;

/// Globally unique identifier of a stored block.
pub type BlockId = Uuid;

/// Metadata of an active block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMeta {
    /// On-disk format version of the block
    #[serde(rename = "format", default)]
    pub version: String,
    #[serde(rename = "blockID")]
    pub block_id: BlockId,
    /// Smallest trace id stored in the block (encoded as written)
    #[serde(rename = "minID", default)]
    pub min_id: String,
    /// Largest trace id stored in the block (encoded as written)
    #[serde(rename = "maxID", default)]
    pub max_id: String,
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    /// Number of objects (traces) in the block
    #[serde(default)]
    pub total_objects: u64,
    /// Size of the block data in bytes
    #[serde(default)]
    pub size: u64,
    /// Number of compaction passes the block has been through; 0 for blocks
    /// written straight from ingestion.
    #[serde(default)]
    pub compaction_level: u8,
    #[serde(default)]
    pub encoding: String,
}
impl BlockMeta {
    pub fn new(
        block_id: BlockId,
        tenant_id: impl Into<String>,
        start_time: OffsetDateTime,
        end_time: OffsetDateTime,
    ) -> Self {
        Self {
            version: String::new(),
            block_id,
            min_id: String::new(),
            max_id: String::new(),
            tenant_id: tenant_id.into(),
            start_time,
            end_time,
            total_objects: 0,
            size: 0,
            compaction_level: 0,
            encoding: String::new(),
        }
    }

    pub fn with_total_objects(mut self, total_objects: u64) -> Self {
        self.total_objects = total_objects;
        self
    }

    pub fn with_compaction_level(mut self, compaction_level: u8) -> Self {
        self.compaction_level = compaction_level;
        self
    }

    /// Mark this block as superseded by a compaction that finished at `at`.
    pub fn into_compacted(self, at: OffsetDateTime) -> CompactedBlockMeta {
        CompactedBlockMeta { meta: self, compacted_time: at }
    }

    /// Decode a `meta.json` document read from `path`.
    pub fn from_json(bytes: &[u8], path: &Path) -> Result<Self> {
        serde_json::from_slice(bytes).or_raise(|| ErrorKind::InvalidData(path.to_path_buf()))
    }
}

/// Metadata of a block that has been superseded by compaction.
///
/// Carries every field of the block it was before compaction, plus the time
/// it was compacted. Derefs to [`BlockMeta`] for the shared fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactedBlockMeta {
    #[serde(flatten)]
    pub meta: BlockMeta,
    #[serde(with = "time::serde::rfc3339")]
    pub compacted_time: OffsetDateTime,
}
impl CompactedBlockMeta {
    /// Decode a `meta.compacted.json` document read from `path`.
    pub fn from_json(bytes: &[u8], path: &Path) -> Result<Self> {
        serde_json::from_slice(bytes).or_raise(|| ErrorKind::InvalidData(path.to_path_buf()))
    }
}
impl Deref for CompactedBlockMeta {
    type Target = BlockMeta;
    fn deref(&self) -> &BlockMeta {
        &self.meta
    }
}
