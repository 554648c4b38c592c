pub mod backend;
pub mod error;
pub mod models;
mod path;
mod reader;

pub use crate::backend::StorageBackend;
pub use crate::models::{BlockId, BlockMeta, CompactedBlockMeta};
pub use crate::path::{COMPACTED_META_NAME, META_NAME, MetaObject, meta_path};
pub use crate::path::validate as validate_path;
pub use crate::reader::BlockReader;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
