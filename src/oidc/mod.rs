//! OIDC trust chain: discovery metadata, JWKS resolution and RS256 token verification.
//!
//! # Verification flow
//!
//! 1. Split the compact token and decode its header and payload.
//! 2. Reject any `alg` other than `RS256`.
//! 3. Compare `iss` against the issuer published in the discovery document.
//! 4. Resolve `kid` through the JWKS cache and rebuild the RSA public key.
//! 5. Verify the signature, then `exp`, `nbf` and `iat` against the clock.
//! 6. Return the full claim set.
//!
//! # Caching
//!
//! - The discovery document is cached for `metadata_ttl` (24 hours by default).
//! - The JWKS index is cached until a token names a `kid` it does not contain.
//!   That lookup fails and the index is forgotten, so the *next* request
//!   re-fetches the key set. There is no retry within a single verification.
//! - Fetches are awaited inline by the request that missed; nothing refreshes in
//!   the background.

pub mod fetcher;
pub mod jwks;
pub mod key;
pub mod metadata;
pub mod verifier;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use telemetry_metrics::counter;

use crate::cache::CacheStore;
use crate::config::OidcConfig;

pub use fetcher::{ConfigFetcher, HttpConfigFetcher};
pub use jwks::{JwkEntry, JwksCache, JwksIndex};
pub use key::PublicKey;
pub use metadata::{MetadataCache, OidcMetadata};
pub use verifier::{Claims, Clock, SystemClock, TokenDecoder, TokenVerifier};

/// Error variants for trust-chain and token failures.
///
/// None of these ever reach a client: the request authenticator collapses all of
/// them into a single 401 and logs [`OidcError::kind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OidcError {
    /// Discovery or JWKS document could not be fetched or is unusable.
    #[error("OIDC configuration error: {0}")]
    Configuration(String),

    /// The token is not a well-formed compact JWS.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The header names an algorithm other than RS256.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The `iss` claim does not match the provider's issuer.
    #[error("Untrusted issuer: {0}")]
    UntrustedIssuer(String),

    /// No signing key is published under the token's `kid`.
    #[error("Unknown key ID: {0}")]
    UnknownKey(String),

    /// The JWK's `n`/`e` do not form a usable RSA public key.
    #[error("Invalid key material: {0}")]
    KeyConstruction(String),

    /// Signature or time-claim validation failed.
    #[error("Token verification failed: {0}")]
    TokenVerification(String),
}

impl OidcError {
    /// Stable snake_case label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::MalformedToken(_) => "malformed_token",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::UntrustedIssuer(_) => "untrusted_issuer",
            Self::UnknownKey(_) => "unknown_key",
            Self::KeyConstruction(_) => "key_construction",
            Self::TokenVerification(_) => "token_verification",
        }
    }
}

/// Count one document fetch by outcome.
pub(crate) fn record_fetch<T>(document: &'static str, result: &Result<T, OidcError>) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    counter!(
        "oidc_guard_document_fetch_total",
        "document" => document,
        "outcome" => outcome
    )
    .increment(1);
}

/// Decode a base64url JWK component, tolerating trailing `=` padding.
///
/// Token segments are decoded strictly unpadded in the verifier.
pub(crate) fn decode_b64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD
        .decode(input)
        .or_else(|_| URL_SAFE.decode(input))
}

/// The wired-up trust chain for one identity provider.
///
/// Holds the metadata cache, JWKS cache and verifier that share one cache store
/// and one fetcher. Built once at startup and shared behind `Arc`s.
#[derive(Clone)]
pub struct TrustChain {
    /// Discovery document cache
    pub metadata: Arc<MetadataCache>,
    /// Signing-key cache
    pub jwks: Arc<JwksCache>,
    /// Token verifier
    pub verifier: Arc<TokenVerifier>,
}

impl TrustChain {
    /// Build the chain with an HTTP fetcher configured from `config`.
    pub fn from_config(config: &OidcConfig, cache: Arc<dyn CacheStore>) -> Result<Self, OidcError> {
        let fetcher = HttpConfigFetcher::new(config.http_timeout, !config.allow_insecure_http)?;
        Ok(Self::with_fetcher(config, cache, Arc::new(fetcher)))
    }

    /// Build the chain around an explicit fetcher.
    #[must_use]
    pub fn with_fetcher(
        config: &OidcConfig,
        cache: Arc<dyn CacheStore>,
        fetcher: Arc<dyn ConfigFetcher>,
    ) -> Self {
        let metadata = Arc::new(MetadataCache::new(
            config.discovery_url.clone(),
            config.metadata_ttl,
            Arc::clone(&cache),
            Arc::clone(&fetcher),
        ));
        let jwks = Arc::new(JwksCache::new(Arc::clone(&metadata), cache, fetcher));
        let verifier = Arc::new(
            TokenVerifier::new(Arc::clone(&metadata), Arc::clone(&jwks))
                .with_leeway(config.leeway_secs),
        );

        Self {
            metadata,
            jwks,
            verifier,
        }
    }
}
