//! Backend selection.

use crate::error::{ErrorKind, Result};
use crate::models::TraceStorageConfig;
use blockscope_storage::BackendHandle;
use blockscope_storage::backend::{GcsBackend, GcsOptions, LocalBackend, S3Backend, S3Options};
use blockscope_storage::error::ErrorKind as StorageErrorKind;
use exn::{Exn, ResultExt};
use std::sync::Arc;

/// Construct the backend named by `config.backend`.
pub fn connect(config: &TraceStorageConfig) -> Result<BackendHandle> {
    let name = config.backend.as_str();
    let backend: blockscope_storage::error::Result<BackendHandle> = match name {
        // Relative paths (`--bucket ./traces`) are taken from the working directory.
        "local" => std::path::absolute(&config.local.path)
            .map_err(|e| Exn::from(StorageErrorKind::from(e)))
            .and_then(|root| LocalBackend::new(name, root))
            .map(|b| Arc::new(b) as BackendHandle),
        "s3" => S3Backend::new(
            name,
            S3Options {
                bucket: config.s3.bucket.clone(),
                prefix: config.s3.prefix.clone(),
                region: config.s3.region.clone(),
                endpoint: config.s3.endpoint.clone(),
                insecure: config.s3.insecure,
                access_key: config.s3.access_key.clone(),
                secret_key: config.s3.secret_key.clone(),
            },
        )
        .map(|b| Arc::new(b) as BackendHandle),
        "gcs" => GcsBackend::new(
            name,
            GcsOptions {
                bucket: config.gcs.bucket_name.clone(),
                prefix: config.gcs.prefix.clone(),
                endpoint: config.gcs.endpoint.clone(),
                token: config.gcs.token.clone(),
            },
        )
        .map(|b| Arc::new(b) as BackendHandle),
        other => exn::bail!(ErrorKind::UnknownBackend(other.to_string())),
    };
    let backend = backend.or_raise(|| ErrorKind::Connection(name.to_string()))?;
    tracing::info!(backend = name, "Connected to storage backend");
    Ok(backend)
}
