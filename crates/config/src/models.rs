//! Configuration models.
//!
//! The layout follows the server configuration file the storage was written
//! with (`storage.trace.*`, `compactor.compaction.*`), so that file can be
//! handed to `--config-file` as is. Keys this tool doesn't know are ignored.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_COMPACTION_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub compactor: CompactorConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub trace: TraceStorageConfig,
}

/// Where blocks are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceStorageConfig {
    /// One of `local`, `s3` or `gcs`.
    pub backend: String,
    pub local: LocalConfig,
    pub s3: S3Config,
    pub gcs: GcsConfig,
}
impl Default for TraceStorageConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            local: LocalConfig::default(),
            s3: S3Config::default(),
            gcs: GcsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub path: PathBuf,
}
impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/blockscope/traces"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    /// Use plain HTTP for an endpoint given as a bare host
    pub insecure: bool,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub prefix: Option<String>,
}
impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: None,
            insecure: false,
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            prefix: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    pub bucket_name: String,
    pub endpoint: Option<String>,
    /// OAuth2 bearer token; anonymous requests when unset.
    pub token: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactorConfig {
    pub compaction: CompactionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Width of the time window blocks are grouped into.
    #[serde(with = "humantime_serde")]
    pub compaction_window: Duration,
}
impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            compaction_window: DEFAULT_COMPACTION_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of blocks fetched at the same time.
    pub concurrency: usize,
}
impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}
