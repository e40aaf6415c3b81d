//! OIDC discovery document cache

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::{ConfigFetcher, OidcError, record_fetch};
use crate::cache::{CacheStore, remember};

/// Cache key for the discovery document
pub const METADATA_CACHE_KEY: &str = "openid.configuration";

/// Default lifetime of a cached discovery document
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Provider metadata from `/.well-known/openid-configuration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcMetadata {
    /// Issuer identifier every accepted token must carry in `iss`
    pub issuer: String,
    /// Location of the provider's signing keys
    pub jwks_uri: String,
    /// Every other provider field, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OidcMetadata {
    /// Validate a fetched discovery document.
    ///
    /// The document must be a JSON object whose `issuer` and `jwks_uri` are
    /// non-empty strings.
    pub fn from_document(document: Value) -> Result<Self, OidcError> {
        let Value::Object(mut fields) = document else {
            return Err(OidcError::Configuration(
                "discovery document is not a JSON object".to_string(),
            ));
        };

        let issuer = take_required(&mut fields, "issuer")?;
        let jwks_uri = take_required(&mut fields, "jwks_uri")?;

        Ok(Self {
            issuer,
            jwks_uri,
            extra: fields,
        })
    }
}

fn take_required(fields: &mut Map<String, Value>, name: &str) -> Result<String, OidcError> {
    match fields.remove(name) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        Some(_) => Err(OidcError::Configuration(format!(
            "discovery document field '{name}' is not a non-empty string"
        ))),
        None => Err(OidcError::Configuration(format!(
            "discovery document is missing '{name}'"
        ))),
    }
}

/// Caches the discovery document for a fixed TTL.
pub struct MetadataCache {
    discovery_url: String,
    ttl: Duration,
    cache: Arc<dyn CacheStore>,
    fetcher: Arc<dyn ConfigFetcher>,
}

impl MetadataCache {
    /// Create a cache for the document at `discovery_url`.
    #[must_use]
    pub fn new(
        discovery_url: String,
        ttl: Duration,
        cache: Arc<dyn CacheStore>,
        fetcher: Arc<dyn ConfigFetcher>,
    ) -> Self {
        Self {
            discovery_url,
            ttl,
            cache,
            fetcher,
        }
    }

    /// The discovery URL this cache reads from
    #[must_use]
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// Return the provider metadata, fetching it on a cache miss.
    ///
    /// Invalid documents are never cached, so the next call fetches again.
    pub async fn metadata(&self) -> Result<OidcMetadata, OidcError> {
        remember(self.cache.as_ref(), METADATA_CACHE_KEY, self.ttl, || self.fetch()).await
    }

    /// The provider's issuer identifier.
    pub async fn issuer(&self) -> Result<String, OidcError> {
        Ok(self.metadata().await?.issuer)
    }

    async fn fetch(&self) -> Result<OidcMetadata, OidcError> {
        let result = match self.fetcher.fetch(&self.discovery_url).await {
            Ok(document) => OidcMetadata::from_document(document),
            Err(e) => Err(e),
        };
        record_fetch("metadata", &result);

        if let Ok(metadata) = &result {
            info!(
                issuer = %metadata.issuer,
                jwks_uri = %metadata.jwks_uri,
                ttl_secs = self.ttl.as_secs(),
                "Discovery document cached"
            );
        }
        result
    }
}
