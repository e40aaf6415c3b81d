//! Authenticated identity attached to a request

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;

use super::AuthenticationFailure;
use crate::oidc::Claims;

/// Identity of the caller, built only from verified [`Claims`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    iss: String,
    sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

impl Principal {
    /// Issuer that vouched for this identity
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.iss
    }

    /// Subject identifier, unique within the issuer
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.sub
    }

    /// Email address, when the token carries one
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Stable user identifier. This is the subject.
    #[must_use]
    pub fn auth_identifier(&self) -> &str {
        &self.sub
    }
}

impl From<&Claims> for Principal {
    fn from(claims: &Claims) -> Self {
        Self {
            iss: claims.issuer().to_string(),
            sub: claims.subject().to_string(),
            email: claims
                .get("email")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
        }
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self::from(&claims)
    }
}

/// Reads the principal the auth middleware attached.
///
/// Handlers behind the middleware can take `Principal` as an argument; outside
/// it the extractor rejects with 401.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthenticationFailure;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthenticationFailure)
    }
}
