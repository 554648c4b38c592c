//! Layered configuration loading.
//!
//! Values are merged in order, later layers winning:
//! 1. Built-in defaults
//! 2. The configuration file (explicit path, or the per-user default if it exists)
//! 3. Environment variables (`BLOCKSCOPE_STORAGE__TRACE__BACKEND=s3`)
//! 4. Command-line overrides

use crate::error::{ErrorKind, Result};
use crate::models::Config;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "BLOCKSCOPE_";
const DEFAULT_FILE_NAME: &str = "config.yaml";

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub backend: Option<String>,
    /// Replaces the local path, the S3 bucket and the GCS bucket at once.
    pub bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub compaction_window: Option<Duration>,
    pub concurrency: Option<usize>,
}
impl Overrides {
    fn merge_into(&self, mut figment: Figment) -> Figment {
        fn set<T: serde::Serialize>(figment: Figment, key: &str, value: Option<T>) -> Figment {
            match value {
                Some(value) => figment.merge(Serialized::default(key, value)),
                None => figment,
            }
        }
        figment = set(figment, "storage.trace.backend", self.backend.as_deref());
        for key in ["storage.trace.local.path", "storage.trace.s3.bucket", "storage.trace.gcs.bucket_name"] {
            figment = set(figment, key, self.bucket.as_deref());
        }
        figment = set(figment, "storage.trace.s3.endpoint", self.s3_endpoint.as_deref());
        figment = set(figment, "storage.trace.s3.access_key", self.s3_access_key.as_deref());
        figment = set(figment, "storage.trace.s3.secret_key", self.s3_secret_key.as_deref());
        figment = set(
            figment,
            "compactor.compaction.compaction_window",
            self.compaction_window.map(humantime_serde::Serde::from),
        );
        set(figment, "scan.concurrency", self.concurrency)
    }
}

/// Per-user configuration file location, e.g. `~/.config/blockscope/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "blockscope").map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
}

/// Load the configuration.
///
/// With no explicit `file`, the per-user default is used when it exists and
/// skipped silently otherwise. An explicit `file` that doesn't exist is an
/// error.
pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    match file {
        Some(file) => build(Some(file), overrides),
        None => {
            let default = default_config_path().filter(|path| path.is_file());
            if let Some(path) = &default {
                tracing::debug!(path = %path.display(), "Using default configuration file");
            }
            build(default.as_deref(), overrides)
        },
    }
}

fn build(file: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(file) = file {
        if !file.is_file() {
            exn::bail!(ErrorKind::Configuration(format!("configuration file {} not found", file.display())));
        }
        figment = match file.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => figment.merge(Toml::file_exact(file)),
            Some("json") => figment.merge(Json::file_exact(file)),
            _ => figment.merge(Yaml::file_exact(file)),
        };
    }
    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
    figment = overrides.merge_into(figment);

    let config: Config = figment
        .extract()
        .or_raise(|| ErrorKind::Configuration("cannot read configuration values".to_string()))?;
    validate(&config)?;
    tracing::debug!(backend = %config.storage.trace.backend, "Configuration loaded");
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.scan.concurrency == 0 {
        exn::bail!(ErrorKind::Configuration("scan.concurrency must be at least 1".to_string()));
    }
    if config.compactor.compaction.compaction_window < Duration::from_secs(1) {
        exn::bail!(ErrorKind::Configuration(
            "compactor.compaction.compaction_window must be at least one second".to_string()
        ));
    }
    Ok(())
}
