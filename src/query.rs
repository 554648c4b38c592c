//! Trace lookup against a running query API.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// `{endpoint}/api/traces/{trace_id}`, keeping any path the endpoint already
/// has. The id is a single path segment, escaped as needed.
fn trace_url(endpoint: &str, trace_id: &str) -> Result<Url> {
    let invalid = || ErrorKind::Query(format!("invalid endpoint `{endpoint}`"));
    let mut url = Url::parse(endpoint).or_raise(invalid)?;
    url.path_segments_mut()
        .ok()
        .ok_or_raise(invalid)?
        .pop_if_empty()
        .extend(["api", "traces", trace_id]);
    Ok(url)
}

/// Fetch one trace as JSON.
///
/// # Errors
///
/// [`ErrorKind::QueryStatus`] for a non-success response,
/// [`ErrorKind::Query`] if the endpoint can't be reached or the body isn't
/// JSON.
#[tracing::instrument(skip(org_id))]
pub async fn query_trace(endpoint: &str, trace_id: &str, org_id: Option<&str>) -> Result<Value> {
    let url = trace_url(endpoint, trace_id)?;
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .or_raise(|| ErrorKind::Query("cannot build HTTP client".to_string()))?;
    let mut request = client.get(url.clone());
    if let Some(org_id) = org_id {
        request = request.header(ORG_ID_HEADER, org_id);
    }
    let response = request.send().await.or_raise(|| ErrorKind::Query(format!("cannot reach {url}")))?;
    let status = response.status();
    tracing::debug!(%status, "Trace endpoint responded");
    if !status.is_success() {
        exn::bail!(ErrorKind::QueryStatus(status.as_u16()));
    }
    response
        .json()
        .await
        .or_raise(|| ErrorKind::Query("response is not valid JSON".to_string()))
}
