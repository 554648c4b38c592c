//! Configuration for blockscope: layered loading and storage backend
//! selection.

mod connect;
pub mod error;
mod load;
mod models;

pub use crate::connect::connect;
pub use crate::load::{ENV_PREFIX, Overrides, default_config_path, load};
pub use crate::models::{
    CompactionConfig, CompactorConfig, Config, DEFAULT_COMPACTION_WINDOW, DEFAULT_CONCURRENCY, GcsConfig, LocalConfig,
    S3Config, ScanConfig, StorageConfig, TraceStorageConfig,
};
