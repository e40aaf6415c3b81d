//! Fixtures shared by unit tests: an in-process identity provider, signing
//! keys and a fixed clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::rand_core::OsRng;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};

use crate::cache::{CacheStore, InMemoryCache};
use crate::config::OidcConfig;
use crate::oidc::{Clock, ConfigFetcher, OidcError, TokenVerifier, TrustChain};

pub const ISSUER: &str = "https://idp.example";
pub const DISCOVERY_URL: &str = "https://idp.example/.well-known/openid-configuration";
pub const JWKS_URL: &str = "https://idp.example/jwks";
/// Fixed "now" for time-claim tests
pub const NOW: u64 = 1_700_000_000;

/// RSA signing key with its public half exposed as JWK parameters
pub struct TestKey {
    private: RsaPrivateKey,
}

impl TestKey {
    fn generate() -> Self {
        Self {
            private: RsaPrivateKey::new(&mut OsRng, 2048).expect("generate RSA test key"),
        }
    }

    /// Modulus, base64url
    pub fn n(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.private.n().to_bytes_be())
    }

    /// Public exponent, base64url
    pub fn e(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.private.e().to_bytes_be())
    }

    /// Public JWK published under `kid`
    pub fn jwk(&self, kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": self.n(),
            "e": self.e(),
        })
    }

    /// RSASSA-PKCS1-v1_5 / SHA-256 signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        SigningKey::<Sha256>::new(self.private.clone())
            .sign(message)
            .to_bytes()
            .to_vec()
    }
}

/// Key published as `k1` by [`StaticFetcher::idp`]
pub fn primary_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(TestKey::generate)
}

/// A key the provider never publishes
pub fn other_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(TestKey::generate)
}

/// Sign arbitrary header and claims into a compact token
pub fn mint(key: &TestKey, header: &Value, claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(header.to_string());
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signing_input = format!("{header}.{payload}");
    let signature = URL_SAFE_NO_PAD.encode(key.sign(signing_input.as_bytes()));
    format!("{signing_input}.{signature}")
}

/// RS256 token signed by [`primary_key`] under `kid`
pub fn mint_rs256(kid: &str, claims: &Value) -> String {
    mint(
        primary_key(),
        &json!({"alg": "RS256", "typ": "JWT", "kid": kid}),
        claims,
    )
}

/// Claims valid at [`NOW`] for `sub=user-42`
pub fn valid_claims() -> Value {
    json!({
        "iss": ISSUER,
        "sub": "user-42",
        "aud": "some-client",
        "email": "user42@idp.example",
        "iat": NOW - 10,
        "nbf": NOW - 10,
        "exp": NOW + 300,
    })
}

pub fn discovery_doc() -> Value {
    json!({
        "issuer": ISSUER,
        "jwks_uri": JWKS_URL,
        "authorization_endpoint": "https://idp.example/authorize",
        "id_token_signing_alg_values_supported": ["RS256"],
    })
}

pub fn jwks_doc(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

/// In-process fetcher serving fixed documents and counting requests per URL
#[derive(Default)]
pub struct StaticFetcher {
    documents: Mutex<HashMap<String, Value>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    /// Fetcher with no documents; every fetch fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider at [`ISSUER`] publishing [`primary_key`] as `k1`
    pub fn idp() -> Self {
        Self::idp_with_keys(vec![primary_key().jwk("k1")])
    }

    /// Provider at [`ISSUER`] publishing `keys`
    pub fn idp_with_keys(keys: Vec<Value>) -> Self {
        let fetcher = Self::new();
        fetcher.set(DISCOVERY_URL, discovery_doc());
        fetcher.set(JWKS_URL, jwks_doc(keys));
        fetcher
    }

    pub fn set(&self, url: &str, document: Value) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), document);
    }

    pub fn remove(&self, url: &str) {
        self.documents.lock().unwrap().remove(url);
    }

    /// Number of fetches issued for `url`
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ConfigFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Value, OidcError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| OidcError::Configuration(format!("{url} returned HTTP 404")))
    }
}

/// Cache store that counts `forget` calls
#[derive(Default)]
pub struct CountingCache {
    inner: InMemoryCache,
    forgets: AtomicUsize,
}

impl CountingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forgets(&self) -> usize {
        self.forgets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.inner.put(key, value, ttl).await;
    }

    async fn put_forever(&self, key: &str, value: Value) {
        self.inner.put_forever(key, value).await;
    }

    async fn forget(&self, key: &str) -> bool {
        self.forgets.fetch_add(1, Ordering::SeqCst);
        self.inner.forget(key).await
    }
}

pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Trust chain wired to a [`StaticFetcher`] with the clock pinned at [`NOW`]
pub struct Harness {
    pub verifier: TokenVerifier,
    pub fetcher: Arc<StaticFetcher>,
    pub cache: Arc<CountingCache>,
}

impl Harness {
    pub fn new(fetcher: StaticFetcher) -> Self {
        Self::with_leeway(fetcher, 0)
    }

    pub fn with_leeway(fetcher: StaticFetcher, leeway_secs: u64) -> Self {
        let fetcher = Arc::new(fetcher);
        let cache = Arc::new(CountingCache::new());
        let config = OidcConfig {
            discovery_url: DISCOVERY_URL.to_string(),
            ..OidcConfig::default()
        };

        let chain = TrustChain::with_fetcher(
            &config,
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            Arc::clone(&fetcher) as Arc<dyn ConfigFetcher>,
        );
        let verifier = TokenVerifier::new(chain.metadata, chain.jwks)
            .with_clock(Arc::new(FixedClock(NOW)))
            .with_leeway(leeway_secs);

        Self {
            verifier,
            fetcher,
            cache,
        }
    }
}
