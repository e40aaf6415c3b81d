//! Outbound fetch of JSON documents (discovery, JWKS)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, warn};

use super::OidcError;

/// Retrieves and parses a remote JSON document. No caching, no retries.
#[async_trait]
pub trait ConfigFetcher: Send + Sync + 'static {
    /// GET `url` and parse the body.
    ///
    /// Fails with [`OidcError::Configuration`] when the request fails, the status
    /// is not 2xx, or the body is not a JSON object or array.
    async fn fetch(&self, url: &str) -> Result<Value, OidcError>;
}

/// [`ConfigFetcher`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpConfigFetcher {
    http: reqwest::Client,
}

impl HttpConfigFetcher {
    /// Create a fetcher with a bounded request timeout.
    ///
    /// With `https_only` set, plain-HTTP URLs are refused by the client itself.
    pub fn new(timeout: Duration, https_only: bool) -> Result<Self, OidcError> {
        let http = reqwest::Client::builder()
            .https_only(https_only)
            .timeout(timeout)
            .user_agent(concat!("oidc-guard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OidcError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, OidcError> {
        debug!(url = %url, "Fetching document");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Document request failed");
                OidcError::Configuration(format!("request to {url} failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "Document fetch returned error status");
            return Err(OidcError::Configuration(format!(
                "{url} returned HTTP {status}"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            OidcError::Configuration(format!("{url} did not return valid JSON: {e}"))
        })?;

        if !(body.is_object() || body.is_array()) {
            return Err(OidcError::Configuration(format!(
                "{url} returned a JSON scalar, expected an object or array"
            )));
        }

        Ok(body)
    }
}
