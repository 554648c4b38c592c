//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, MinIO, Backblaze B2, and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file (or the
//! command line). Each backend specifies its own `access_key` and
//! `secret_key`.

use crate::{
    StorageBackend,
    backend::NameStream,
    error::{ErrorKind, Result},
    validate_path,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// Connection settings for an [`S3Backend`].
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    /// Bucket name
    pub bucket: String,
    /// Optional key prefix (acts as virtual directory)
    pub prefix: Option<String>,
    /// AWS region or provider-specific region
    pub region: String,
    /// Custom endpoint URL for S3-compatible services
    pub endpoint: Option<String>,
    /// Talk plain HTTP to an endpoint given without a scheme
    pub insecure: bool,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// S3-compatible storage backend.
///
/// Reads blocks from an S3 bucket, optionally under a key prefix. All paths
/// are relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use blockscope_storage::backend::{S3Backend, S3Options};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new("s3", S3Options {
///     bucket: "tempo".to_string(),
///     region: "us-east-2".to_string(),
///     endpoint: Some("https://s3.dualstack.us-east-2.amazonaws.com".to_string()),
///     access_key: Some("access_key_id".to_string()),
///     secret_key: Some("secret_access_key".to_string()),
///     ..Default::default()
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// No request is made here; a wrong endpoint or bad credentials surface on
    /// the first listing.
    pub fn new(name: impl Into<String>, options: S3Options) -> Result<Self> {
        let S3Options { bucket, prefix, region, endpoint, insecure, access_key, secret_key } = options;
        if bucket.is_empty() {
            exn::bail!(ErrorKind::InvalidConfig("s3 bucket is not set".to_string()));
        }
        let prefix = prefix
            .filter(|p| !p.trim_matches('/').is_empty())
            .map(validate_path)
            .transpose()?
            .map(|p| p.to_str().map(|s| s.to_string()).ok_or_raise(|| ErrorKind::InvalidPath(p)))
            .transpose()?;
        let (Some(key_id), Some(key_secret)) = (access_key, secret_key) else {
            exn::bail!(ErrorKind::InvalidConfig("s3 access key and secret key are both required".to_string()));
        };
        let credentials = Credentials::new(key_id, key_secret, None, None, "blockscope-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (MinIO, Backblaze, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint.filter(|e| !e.is_empty()) {
            config_builder = config_builder.endpoint_url(Self::normalize_endpoint(&endpoint_url, insecure));
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket,
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Endpoints are commonly configured as bare host names
    /// (`s3.us-east-2.amazonaws.com` or `minio:9000`); the SDK wants a URL.
    /// An explicit scheme always wins over `insecure`.
    fn normalize_endpoint(endpoint: &str, insecure: bool) -> String {
        if endpoint.contains("://") {
            endpoint.to_string()
        } else if insecure {
            format!("http://{endpoint}")
        } else {
            format!("https://{endpoint}")
        }
    }

    /// Join the configured prefix and a validated relative path into a key.
    fn join_key(prefix: Option<&str>, path: &str) -> String {
        match prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path),
            None => path.to_string(),
        }
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        let path_str = validated.to_str().ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?;
        Ok(Self::join_key(self.prefix.as_deref(), path_str))
    }

    /// Key prefix to list the children of `path` (or of the root).
    fn listing_prefix(&self, path: Option<&Path>) -> Result<String> {
        Ok(match (path, &self.prefix) {
            (Some(path), _) => format!("{}/", self.full_key(path)?),
            (None, Some(prefix)) => format!("{}/", prefix.trim_end_matches('/')),
            (None, None) => String::new(),
        })
    }

    /// Reduce a common prefix returned by a delimited listing to the child
    /// name below the listing prefix.
    fn child_name<'k>(listing_prefix: &str, common_prefix: &'k str) -> Option<&'k str> {
        let name = common_prefix.strip_prefix(listing_prefix)?.trim_end_matches('/');
        (!name.is_empty()).then_some(name)
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> OwnedSemaphorePermit {
        // unwrap is safe: semaphore is never closed
        self.rate_limiter.clone().acquire_owned().await.unwrap()
    }

    /// Some S3-compatible services answer a missing key with a bare 404
    /// instead of a `NoSuchKey` error code.
    fn is_http_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
        err.raw_response().is_some_and(|response| response.status().as_u16() == 404)
    }

    fn network_error<E>(err: &SdkError<E, HttpResponse>, key: &str) -> ErrorKind
    where
        E: std::error::Error + 'static,
    {
        ErrorKind::Network(format!("s3 request for `{key}` failed: {}", DisplayErrorContext(err)))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> NameStream<'a> {
        let listing_prefix = match self.listing_prefix(prefix) {
            Ok(p) => p,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            let mut continuation: Option<String> = None;
            loop {
                let response = {
                    let _permit = self.acquire_permit().await;
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(&listing_prefix)
                        .delimiter("/")
                        .set_continuation_token(continuation.take())
                        .send()
                        .await
                };
                let output = match response {
                    Ok(output) => output,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::network_error(&err, &listing_prefix)));
                        return;
                    },
                };
                for common in output.common_prefixes() {
                    if let Some(name) = common.prefix().and_then(|p| Self::child_name(&listing_prefix, p)) {
                        yield Ok(name.to_string());
                    }
                }
                match output.next_continuation_token() {
                    Some(token) if output.is_truncated().unwrap_or(false) => continuation = Some(token.to_string()),
                    _ => break,
                }
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await;
        let output = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
            },
            Err(err) if Self::is_http_not_found(&err) => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Err(err) => exn::bail!(Self::network_error(&err, &key)),
        };
        let body = output
            .body
            .collect()
            .await
            .or_raise(|| ErrorKind::Network(format!("s3 body for `{key}` was interrupted")))?;
        Ok(body.into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn options() -> S3Options {
        S3Options {
            bucket: "tempo".to_string(),
            region: "us-east-1".to_string(),
            access_key: Some("id".to_string()),
            secret_key: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(None, "t/b/meta.json", "t/b/meta.json")]
    #[case(Some("traces"), "t/b/meta.json", "traces/t/b/meta.json")]
    #[case(Some("traces/"), "t/b/meta.json", "traces/t/b/meta.json")]
    fn test_join_key(#[case] prefix: Option<&str>, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(S3Backend::join_key(prefix, path), expected);
    }

    #[rstest]
    #[case("t/", "t/b1/", Some("b1"))]
    #[case("", "t1/", Some("t1"))]
    #[case("t/", "t/", None)]
    #[case("t/", "other/b1/", None)]
    fn test_child_name(#[case] listing: &str, #[case] common: &str, #[case] expected: Option<&str>) {
        assert_eq!(S3Backend::child_name(listing, common), expected);
    }

    #[rstest]
    #[case("s3.dualstack.us-east-2.amazonaws.com", false, "https://s3.dualstack.us-east-2.amazonaws.com")]
    #[case("minio:9000", true, "http://minio:9000")]
    #[case("http://localhost:9000", false, "http://localhost:9000")]
    #[case("https://s3.example.com", true, "https://s3.example.com")]
    fn test_normalize_endpoint(#[case] endpoint: &str, #[case] insecure: bool, #[case] expected: &str) {
        assert_eq!(S3Backend::normalize_endpoint(endpoint, insecure), expected);
    }

    #[test]
    fn test_listing_prefix() {
        let backend = S3Backend::new("s3", S3Options { prefix: Some("traces/".to_string()), ..options() }).unwrap();
        assert_eq!(backend.listing_prefix(None).unwrap(), "traces/");
        assert_eq!(backend.listing_prefix(Some(Path::new("tenant"))).unwrap(), "traces/tenant/");
        let backend = S3Backend::new("s3", options()).unwrap();
        assert_eq!(backend.listing_prefix(None).unwrap(), "");
        assert!(backend.listing_prefix(Some(Path::new("../up"))).is_err());
    }

    #[test]
    fn test_new_requires_bucket_and_credentials() {
        let err = S3Backend::new("s3", S3Options { bucket: String::new(), ..options() }).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidConfig(_)));
        let err = S3Backend::new("s3", S3Options { secret_key: None, ..options() }).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidConfig(_)));
    }
}
