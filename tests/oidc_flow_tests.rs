//! Trust-chain tests over real HTTP
//!
//! Covers caching behaviour that only shows up across requests: metadata and
//! keys fetched once, key rotation picked up after an unknown `kid`, and
//! failed fetches never cached.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{DISCOVERY_PATH, Idp, JWKS_PATH, claims, jwks, mint};
use oidc_guard::cache::{CacheStore, InMemoryCache};
use oidc_guard::oidc::{OidcError, TrustChain};

fn chain(idp: &Idp) -> (TrustChain, Arc<InMemoryCache>) {
    let cache = Arc::new(InMemoryCache::new());
    let chain = TrustChain::from_config(
        &idp.config().oidc,
        Arc::clone(&cache) as Arc<dyn CacheStore>,
    )
    .unwrap();
    (chain, cache)
}

#[tokio::test]
async fn documents_are_fetched_once_across_requests() {
    // GIVEN: a provider that must be asked exactly once for each document
    let idp = Idp::start().await;
    idp.serve_discovery(1).await;
    idp.serve_jwks(&["k1"], 1).await;
    let (chain, cache) = chain(&idp);

    // WHEN: verifying several tokens
    for sub in ["alice", "bob", "carol"] {
        let verified = chain.verifier.verify(&mint("k1", &claims(sub))).await.unwrap();
        assert_eq!(verified.subject(), sub);
    }

    // THEN: both documents sit in the cache (mock expectations are checked on drop)
    assert!(cache.get("openid.configuration").await.is_some());
    assert!(cache.get("openid.jwks").await.is_some());
}

#[tokio::test]
async fn rotated_key_is_accepted_on_the_following_request() {
    let idp = Idp::start().await;
    idp.serve_discovery(1).await;
    // First key set only knows k1; once consumed the rotated set is served
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["k1"])))
        .up_to_n_times(1)
        .expect(1)
        .mount(&idp.server)
        .await;
    idp.serve_jwks(&["k1", "k2"], 1).await;
    let (chain, _cache) = chain(&idp);

    let token = mint("k2", &claims("user-42"));

    let first = chain.verifier.verify(&token).await.unwrap_err();
    assert_eq!(first, OidcError::UnknownKey("k2".to_string()));

    let second = chain.verifier.verify(&token).await.unwrap();
    assert_eq!(second.subject(), "user-42");
}

#[tokio::test]
async fn failed_discovery_is_not_cached() {
    let idp = Idp::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&idp.server)
        .await;
    let (chain, cache) = chain(&idp);
    let token = mint("k1", &claims("user-42"));

    for _ in 0..2 {
        let err = chain.verifier.verify(&token).await.unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }
    assert!(cache.get("openid.configuration").await.is_none());
}

#[tokio::test]
async fn discovery_document_must_name_issuer_and_jwks_uri() {
    let idp = Idp::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"issuer": common::ISSUER})),
        )
        .mount(&idp.server)
        .await;
    let (chain, _cache) = chain(&idp);

    let err = chain.metadata.metadata().await.unwrap_err();
    assert!(matches!(err, OidcError::Configuration(_)));
}

#[tokio::test]
async fn jwks_without_keys_array_is_configuration_error() {
    let idp = Idp::start().await;
    idp.serve_discovery(1).await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&idp.server)
        .await;
    let (chain, _cache) = chain(&idp);

    let err = chain.jwks.keys().await.unwrap_err();
    assert_eq!(err.kind(), "configuration");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_cold_misses_each_may_fetch() {
    // GIVEN: a cold cache; racing misses take no lock, so each may fetch
    let idp = Idp::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(idp.discovery_doc()))
        .expect(1..=2)
        .mount(&idp.server)
        .await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(&["k1"])))
        .expect(1..=2)
        .mount(&idp.server)
        .await;
    let (chain, cache) = chain(&idp);

    // WHEN: two requests verify at the same time
    let alice = mint("k1", &claims("alice"));
    let bob = mint("k1", &claims("bob"));
    let (a, b) = tokio::join!(chain.verifier.verify(&alice), chain.verifier.verify(&bob));

    // THEN: both succeed and the last write left both documents cached
    assert_eq!(a.unwrap().subject(), "alice");
    assert_eq!(b.unwrap().subject(), "bob");
    assert!(cache.get("openid.configuration").await.is_some());
    assert!(cache.get("openid.jwks").await.is_some());
}
