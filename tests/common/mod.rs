//! Shared helpers: a wiremock-backed identity provider and an RS256 token minter

#![allow(dead_code)]

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::rand_core::OsRng;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oidc_guard::config::Config;

pub const ISSUER: &str = "https://idp.example";
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/oauth2/jwks";

/// Identity provider served by a local mock server
pub struct Idp {
    pub server: MockServer,
}

impl Idp {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn discovery_url(&self) -> String {
        format!("{}{DISCOVERY_PATH}", self.server.uri())
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    pub fn discovery_doc(&self) -> Value {
        json!({
            "issuer": ISSUER,
            "jwks_uri": self.jwks_url(),
            "response_types_supported": ["code"],
        })
    }

    /// Serve the discovery document, expecting exactly `times` requests
    pub async fn serve_discovery(&self, times: u64) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.discovery_doc()))
            .expect(times)
            .named("discovery")
            .mount(&self.server)
            .await;
    }

    /// Serve a key set publishing `kids`, expecting exactly `times` requests
    pub async fn serve_jwks(&self, kids: &[&str], times: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(kids)))
            .expect(times)
            .named("jwks")
            .mount(&self.server)
            .await;
    }

    /// Configuration pointing at this provider
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.oidc.discovery_url = self.discovery_url();
        config.oidc.allow_insecure_http = true;
        config
    }
}

fn signing_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).expect("generate RSA test key"))
}

pub fn jwk(kid: &str) -> Value {
    let key = signing_key();
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
    })
}

pub fn jwks(kids: &[&str]) -> Value {
    json!({ "keys": kids.iter().map(|kid| jwk(kid)).collect::<Vec<_>>() })
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Claims for `sub` from [`ISSUER`], valid for the next five minutes
pub fn claims(sub: &str) -> Value {
    let now = now();
    json!({
        "iss": ISSUER,
        "sub": sub,
        "email": format!("{sub}@idp.example"),
        "iat": now,
        "exp": now + 300,
    })
}

/// Sign `claims` as an RS256 token under `kid`
pub fn mint(kid: &str, claims: &Value) -> String {
    let header = json!({"alg": "RS256", "typ": "JWT", "kid": kid});
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    );
    let signature = SigningKey::<Sha256>::new(signing_key().clone())
        .sign(signing_input.as_bytes())
        .to_bytes();
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
}
