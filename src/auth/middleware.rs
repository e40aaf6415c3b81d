//! Bearer-token authentication middleware
//!
//! Token sources, in order:
//! - `Authorization: Bearer <token>` (scheme case-insensitive, one whitespace
//!   separator, token without whitespace)
//! - the `access_token` query parameter
//! - the `access_token` field of an `application/x-www-form-urlencoded` body
//!   (read up to a size limit and handed on intact)
//!
//! A request with no token is rejected without consulting the verifier.

use std::sync::{Arc, LazyLock};

use axum::{
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use telemetry_metrics::counter;
use tracing::{debug, warn};

use super::{AuthenticationFailure, Principal};
use crate::config::AuthConfig;
use crate::oidc::TokenDecoder;

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Bearer\s(\S+)$").expect("static regex"));

/// Authenticates requests against a [`TokenDecoder`].
pub struct Authenticator {
    decoder: Arc<dyn TokenDecoder>,
    public_paths: Vec<String>,
    access_token_param: String,
    max_form_body_bytes: usize,
}

impl Authenticator {
    /// Create an authenticator using `config` for token sources and public paths
    #[must_use]
    pub fn new(decoder: Arc<dyn TokenDecoder>, config: &AuthConfig) -> Self {
        Self {
            decoder,
            public_paths: config.public_paths.clone(),
            access_token_param: config.access_token_param.clone(),
            max_form_body_bytes: config.max_form_body_bytes,
        }
    }

    /// Check if a path is public (bypasses auth)
    ///
    /// A public path matches itself and anything below it, so `/health` covers
    /// `/health/live` but not `/healthz`.
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| {
            path.strip_prefix(p.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || p.ends_with('/'))
        })
    }

    /// Verify `token` and build the caller's principal.
    ///
    /// The verifier's error kind is logged here and then discarded.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthenticationFailure> {
        match self.decoder.decode(token).await {
            Ok(claims) => {
                record_outcome("ok");
                Ok(Principal::from(claims))
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Token rejected");
                record_outcome(e.kind());
                Err(AuthenticationFailure)
            }
        }
    }

    /// Find the presented token, returning the request for further handling.
    ///
    /// The request body is only read when neither the header nor the query
    /// carries a token and the body is form-encoded.
    pub async fn extract_token(&self, request: Request<Body>) -> (Request<Body>, Option<String>) {
        if let Some(token) = bearer_token(request.headers()).map(str::to_string) {
            return (request, Some(token));
        }

        if let Some(token) = query_param(request.uri().query(), &self.access_token_param) {
            return (request, Some(token));
        }

        if !is_form_encoded(request.headers()) {
            return (request, None);
        }

        let (parts, body) = request.into_parts();
        match to_bytes(body, self.max_form_body_bytes).await {
            Ok(bytes) => {
                let token = form_param(&bytes, &self.access_token_param);
                (Request::from_parts(parts, Body::from(bytes)), token)
            }
            Err(e) => {
                debug!(error = %e, "Form body unreadable or over limit");
                (Request::from_parts(parts, Body::empty()), None)
            }
        }
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(auth): State<Arc<Authenticator>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if auth.is_public_path(&path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let (mut request, token) = auth.extract_token(request).await;
    let Some(token) = token else {
        warn!(path = %path, "No bearer token presented");
        record_outcome("missing_token");
        return AuthenticationFailure.into_response();
    };

    match auth.authenticate(&token).await {
        Ok(principal) => {
            debug!(sub = %principal.subject(), path = %path, "Authenticated request");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(failure) => failure.into_response(),
    }
}

/// Token from an `Authorization: Bearer` header, if the header is well formed.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    BEARER
        .captures(value)
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    form_param(query?.as_bytes(), name)
}

/// First non-empty value of `name` in URL-encoded `input`
fn form_param(input: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

fn record_outcome(outcome: &'static str) {
    counter!("oidc_guard_auth_total", "outcome" => outcome).increment(1);
}
