//! JWKS cache: signing keys indexed by `kid`
//!
//! The key set is cached with no expiry. A lookup for a `kid` the index does not
//! contain forgets the whole set and fails; the following request re-fetches it.
//! This is how key rotation is picked up.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ConfigFetcher, MetadataCache, OidcError, record_fetch};
use crate::cache::{CacheStore, remember_forever};

/// Cache key for the indexed key set
pub const JWKS_CACHE_KEY: &str = "openid.jwks";

/// One published JSON Web Key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkEntry {
    /// Key ID
    #[serde(default)]
    pub kid: String,
    /// Key type (`RSA` for every key usable with RS256)
    #[serde(default)]
    pub kty: String,
    /// Algorithm the key is restricted to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Intended use (`sig` or `enc`)
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Modulus, base64url
    #[serde(default)]
    pub n: String,
    /// Public exponent, base64url
    #[serde(default)]
    pub e: String,
}

/// Keys by `kid`
pub type JwksIndex = BTreeMap<String, JwkEntry>;

/// Index a JWKS document by `kid`.
///
/// The document must carry a `keys` array. Entries that are not valid JWK
/// objects, have no `kid`, or are marked for encryption are skipped. When two
/// entries share a `kid`, the later one wins.
pub fn index_keys(document: &Value) -> Result<JwksIndex, OidcError> {
    let keys = document
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| OidcError::Configuration("JWKS document has no 'keys' array".to_string()))?;

    let mut index = JwksIndex::new();
    for (position, raw) in keys.iter().enumerate() {
        let entry: JwkEntry = match serde_json::from_value(raw.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(position, error = %e, "Skipping malformed JWK");
                continue;
            }
        };

        if entry.kid.is_empty() {
            debug!(position, "Skipping JWK without kid");
            continue;
        }
        if entry.key_use.as_deref() == Some("enc") {
            debug!(kid = %entry.kid, "Skipping encryption key");
            continue;
        }

        if let Some(previous) = index.insert(entry.kid.clone(), entry) {
            warn!(kid = %previous.kid, "Duplicate kid in JWKS, keeping the later entry");
        }
    }

    Ok(index)
}

/// Caches the provider's signing keys until explicitly forgotten.
pub struct JwksCache {
    metadata: Arc<MetadataCache>,
    cache: Arc<dyn CacheStore>,
    fetcher: Arc<dyn ConfigFetcher>,
}

impl JwksCache {
    /// Create a cache that locates the key set through `metadata`.
    #[must_use]
    pub fn new(
        metadata: Arc<MetadataCache>,
        cache: Arc<dyn CacheStore>,
        fetcher: Arc<dyn ConfigFetcher>,
    ) -> Self {
        Self {
            metadata,
            cache,
            fetcher,
        }
    }

    /// Return the indexed key set, fetching it on a cache miss.
    pub async fn keys(&self) -> Result<JwksIndex, OidcError> {
        remember_forever(self.cache.as_ref(), JWKS_CACHE_KEY, || self.fetch()).await
    }

    /// Drop the cached key set.
    pub async fn forget(&self) {
        if self.cache.forget(JWKS_CACHE_KEY).await {
            info!("Cached JWKS forgotten");
        }
    }

    /// Look up the key published under `kid`.
    ///
    /// When `kid` is unknown the cached set is forgotten once and this call
    /// fails with [`OidcError::UnknownKey`]; it does not re-fetch.
    pub async fn key(&self, kid: &str) -> Result<JwkEntry, OidcError> {
        let keys = self.keys().await?;
        if let Some(entry) = keys.get(kid) {
            return Ok(entry.clone());
        }

        warn!(kid = %kid, known = keys.len(), "Unknown kid, forgetting cached JWKS");
        self.forget().await;
        Err(OidcError::UnknownKey(kid.to_string()))
    }

    async fn fetch(&self) -> Result<JwksIndex, OidcError> {
        let metadata = self.metadata.metadata().await?;

        let result = match self.fetcher.fetch(&metadata.jwks_uri).await {
            Ok(document) => index_keys(&document),
            Err(e) => Err(e),
        };
        record_fetch("jwks", &result);

        if let Ok(index) = &result {
            info!(
                jwks_uri = %metadata.jwks_uri,
                keys = index.len(),
                "JWKS cached"
            );
        }
        result
    }
}
