//! GCS-compatible storage backend.
//!
//! Talks to the Cloud Storage JSON API directly over HTTP, which is also what
//! GCS emulators (fake-gcs-server and friends) speak. Authentication is an
//! optional OAuth bearer token; without one, requests are anonymous, which
//! works for emulators and public buckets.

use crate::{
    StorageBackend,
    backend::NameStream,
    error::{ErrorKind, Result},
    validate_path,
};
use async_stream::stream;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Public Cloud Storage endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a [`GcsBackend`].
#[derive(Debug, Clone, Default)]
pub struct GcsOptions {
    pub bucket: String,
    /// Optional object name prefix (acts as virtual directory)
    pub prefix: Option<String>,
    /// Defaults to [`DEFAULT_ENDPOINT`]
    pub endpoint: Option<String>,
    /// OAuth 2.0 access token sent as a bearer token
    pub token: Option<String>,
}

/// One page of an `objects.list` response. Only the parts listing needs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectPage {
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

/// GCS-compatible storage backend.
#[derive(Debug, Clone)]
pub struct GcsBackend {
    name: String,
    client: Client,
    /// `{endpoint}/storage/v1/b/{bucket}/o`
    objects_url: Url,
    prefix: Option<String>,
    token: Option<String>,
}

impl GcsBackend {
    pub fn new(name: impl Into<String>, options: GcsOptions) -> Result<Self> {
        let GcsOptions { bucket, prefix, endpoint, token } = options;
        if bucket.is_empty() {
            exn::bail!(ErrorKind::InvalidConfig("gcs bucket is not set".to_string()));
        }
        let endpoint = endpoint.filter(|e| !e.is_empty()).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let objects_url = Self::objects_url(&endpoint, &bucket)?;
        let prefix = prefix
            .filter(|p| !p.trim_matches('/').is_empty())
            .map(validate_path)
            .transpose()?
            .map(|p| p.to_str().map(|s| s.to_string()).ok_or_raise(|| ErrorKind::InvalidPath(p)))
            .transpose()?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .or_raise(|| ErrorKind::InvalidConfig("cannot build HTTP client".to_string()))?;
        Ok(Self {
            name: name.into(),
            client,
            objects_url,
            prefix,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn objects_url(endpoint: &str, bucket: &str) -> Result<Url> {
        let invalid = || ErrorKind::InvalidConfig(format!("invalid gcs endpoint `{endpoint}`"));
        let mut url = Url::parse(endpoint).or_raise(invalid)?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o"]);
        Ok(url)
    }

    /// Full object name for a relative path, including the configured prefix.
    fn object_name(&self, path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        let path_str = validated.to_str().ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path_str),
            None => path_str.to_string(),
        })
    }

    fn listing_prefix(&self, path: Option<&Path>) -> Result<String> {
        Ok(match (path, &self.prefix) {
            (Some(path), _) => format!("{}/", self.object_name(path)?),
            (None, Some(prefix)) => format!("{}/", prefix.trim_end_matches('/')),
            (None, None) => String::new(),
        })
    }

    /// URL of the media (contents) of a single object. The object name is a
    /// single path segment, so its slashes get percent-encoded.
    fn media_url(&self, object: &str) -> Url {
        let mut url = self.objects_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(object);
        }
        url.query_pairs_mut().append_pair("alt", "media");
        url
    }

    fn list_url(&self, listing_prefix: &str, page_token: Option<&str>) -> Url {
        let mut url = self.objects_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("delimiter", "/").append_pair("fields", "prefixes,nextPageToken");
            if !listing_prefix.is_empty() {
                query.append_pair("prefix", listing_prefix);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get(&self, url: Url, path: &Path) -> Result<Response> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .or_raise(|| ErrorKind::Network(format!("gcs request for `{}` failed", path.display())))?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf()))
            },
            status => exn::bail!(ErrorKind::Network(format!("gcs answered {status} for `{}`", path.display()))),
        }
    }

    async fn list_page(&self, listing_prefix: &str, page_token: Option<&str>) -> Result<ObjectPage> {
        let path = Path::new(if listing_prefix.is_empty() { "/" } else { listing_prefix });
        let response = match self.get(self.list_url(listing_prefix, page_token), path).await {
            Ok(response) => response,
            // A missing bucket is an error, but the JSON API never 404s on a
            // prefix; treat it like an empty page anyway to be safe.
            Err(e) if e.is_not_found() && !listing_prefix.is_empty() => return Ok(ObjectPage::default()),
            Err(e) => return Err(e),
        };
        response
            .json()
            .await
            .or_raise(|| ErrorKind::BackendError(format!("unexpected gcs listing for `{listing_prefix}`")))
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> NameStream<'a> {
        let listing_prefix = match self.listing_prefix(prefix) {
            Ok(p) => p,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            let mut page_token: Option<String> = None;
            loop {
                let page = match self.list_page(&listing_prefix, page_token.as_deref()).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                for common in &page.prefixes {
                    let name = common.strip_prefix(listing_prefix.as_str()).map(|n| n.trim_end_matches('/'));
                    if let Some(name) = name.filter(|n| !n.is_empty()) {
                        yield Ok(name.to_string());
                    }
                }
                match page.next_page_token {
                    Some(token) => page_token = Some(token),
                    None => break,
                }
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let object = self.object_name(path)?;
        let response = self.get(self.media_url(&object), path).await?;
        let body = response
            .bytes()
            .await
            .or_raise(|| ErrorKind::Network(format!("gcs body for `{}` was interrupted", path.display())))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(prefix: Option<&str>) -> GcsBackend {
        GcsBackend::new(
            "gcs",
            GcsOptions {
                bucket: "tempo".to_string(),
                prefix: prefix.map(str::to_string),
                endpoint: Some("http://localhost:4443/".to_string()),
                token: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_objects_url() {
        assert_eq!(backend(None).objects_url.as_str(), "http://localhost:4443/storage/v1/b/tempo/o");
        let url = GcsBackend::objects_url(DEFAULT_ENDPOINT, "my-bucket").unwrap();
        assert_eq!(url.as_str(), "https://storage.googleapis.com/storage/v1/b/my-bucket/o");
        assert!(GcsBackend::objects_url("not a url", "b").is_err());
    }

    #[test]
    fn test_media_url_encodes_object_name() {
        let backend = backend(Some("traces"));
        let object = backend.object_name(Path::new("t/b/meta.json")).unwrap();
        assert_eq!(object, "traces/t/b/meta.json");
        assert_eq!(
            backend.media_url(&object).as_str(),
            "http://localhost:4443/storage/v1/b/tempo/o/traces%2Ft%2Fb%2Fmeta.json?alt=media"
        );
    }

    #[test]
    fn test_list_url() {
        let backend = backend(None);
        let prefix = backend.listing_prefix(Some(Path::new("tenant"))).unwrap();
        assert_eq!(prefix, "tenant/");
        let url = backend.list_url(&prefix, Some("abc"));
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("delimiter".to_string(), "/".to_string())));
        assert!(query.contains(&("prefix".to_string(), "tenant/".to_string())));
        assert!(query.contains(&("pageToken".to_string(), "abc".to_string())));
        // Listing the root of an unprefixed bucket sends no prefix at all.
        let url = backend.list_url(&backend.listing_prefix(None).unwrap(), None);
        assert!(url.query_pairs().all(|(k, _)| k != "prefix"));
    }

    #[test]
    fn test_object_page_decoding() {
        let page: ObjectPage =
            serde_json::from_str(r#"{"prefixes": ["t/b1/", "t/b2/"], "nextPageToken": "next"}"#).unwrap();
        assert_eq!(page.prefixes, vec!["t/b1/", "t/b2/"]);
        assert_eq!(page.next_page_token.as_deref(), Some("next"));
        let empty: ObjectPage = serde_json::from_str("{}").unwrap();
        assert!(empty.prefixes.is_empty());
    }

    #[test]
    fn test_new_requires_bucket() {
        let err = GcsBackend::new("gcs", GcsOptions::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidConfig(_)));
    }
}
