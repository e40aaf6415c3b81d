//! RS256 token verifier

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use super::{JwksCache, MetadataCache, OidcError, PublicKey};

/// The only accepted signing algorithm
const ACCEPTED_ALGORITHM: &str = "RS256";

/// Source of the current time in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync + 'static {
    /// Current Unix timestamp
    fn now(&self) -> u64;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

/// Claims of a fully verified token.
///
/// Only the verifier constructs these. `iss` and `sub` are guaranteed strings;
/// every other claim is available by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    #[serde(skip)]
    issuer: String,
    #[serde(skip)]
    subject: String,
    #[serde(flatten)]
    raw: Map<String, Value>,
}

impl Claims {
    pub(crate) fn new(issuer: String, subject: String, raw: Map<String, Value>) -> Self {
        Self {
            issuer,
            subject,
            raw,
        }
    }

    /// `iss` claim
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `sub` claim
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Look up any claim by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }

    /// The complete payload as presented in the token
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }
}

/// Turns a compact token into verified claims.
///
/// The request authenticator depends on this seam rather than on
/// [`TokenVerifier`] directly.
#[async_trait]
pub trait TokenDecoder: Send + Sync + 'static {
    /// Verify `token` and return its claims.
    async fn decode(&self, token: &str) -> Result<Claims, OidcError>;
}

/// Verifies RS256 tokens against the provider's published keys.
pub struct TokenVerifier {
    metadata: Arc<MetadataCache>,
    jwks: Arc<JwksCache>,
    clock: Arc<dyn Clock>,
    leeway_secs: u64,
}

impl TokenVerifier {
    /// Create a verifier using the system clock and no leeway.
    #[must_use]
    pub fn new(metadata: Arc<MetadataCache>, jwks: Arc<JwksCache>) -> Self {
        Self {
            metadata,
            jwks,
            clock: Arc::new(SystemClock),
            leeway_secs: 0,
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Allow `leeway_secs` of clock skew on `exp`, `nbf` and `iat`
    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Verify `token`. Stops at the first failing check.
    pub async fn verify(&self, token: &str) -> Result<Claims, OidcError> {
        let (header, payload) = split_token(token)?;
        let header = decode_segment(header, "header")?;
        let payload = decode_segment(payload, "payload")?;

        match header.get("alg").and_then(Value::as_str) {
            Some(ACCEPTED_ALGORITHM) => {}
            Some(other) => return Err(OidcError::UnsupportedAlgorithm(other.to_string())),
            None => {
                return Err(OidcError::UnsupportedAlgorithm(
                    "header has no 'alg'".to_string(),
                ));
            }
        }

        let issuer = match payload.get("iss") {
            Some(Value::String(iss)) => iss.clone(),
            Some(other) => return Err(OidcError::UntrustedIssuer(other.to_string())),
            None => {
                return Err(OidcError::UntrustedIssuer(
                    "token has no 'iss' claim".to_string(),
                ));
            }
        };
        if issuer != self.metadata.issuer().await? {
            return Err(OidcError::UntrustedIssuer(issuer));
        }

        let kid = header
            .get("kid")
            .and_then(Value::as_str)
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| OidcError::UnknownKey("token header has no 'kid'".to_string()))?;
        let jwk = self.jwks.key(kid).await?;
        let key = PublicKey::from_jwk(&jwk)?;

        key.verify_signature(token)?;
        self.check_time_claims(&payload)?;

        let subject = match payload.get("sub") {
            Some(Value::String(sub)) => sub.clone(),
            _ => {
                return Err(OidcError::MalformedToken(
                    "payload has no string 'sub' claim".to_string(),
                ));
            }
        };

        debug!(sub = %subject, kid = %kid, "Token verified");
        Ok(Claims::new(issuer, subject, payload))
    }

    #[allow(clippy::cast_precision_loss)]
    fn check_time_claims(&self, payload: &Map<String, Value>) -> Result<(), OidcError> {
        let now = self.clock.now() as f64;
        let leeway = self.leeway_secs as f64;

        if let Some(nbf) = numeric_claim(payload, "nbf")? {
            if nbf > now + leeway {
                return Err(OidcError::TokenVerification(format!(
                    "token not valid before {nbf}"
                )));
            }
        }

        if let Some(iat) = numeric_claim(payload, "iat")? {
            if iat > now + leeway {
                return Err(OidcError::TokenVerification(format!(
                    "token issued in the future ({iat})"
                )));
            }
        }

        if let Some(exp) = numeric_claim(payload, "exp")? {
            if now - leeway >= exp {
                return Err(OidcError::TokenVerification(format!(
                    "token expired at {exp}"
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TokenDecoder for TokenVerifier {
    async fn decode(&self, token: &str) -> Result<Claims, OidcError> {
        self.verify(token).await
    }
}

/// Split a compact token into its header and payload segments.
///
/// Exactly three non-empty segments are required.
fn split_token(token: &str) -> Result<(&str, &str), OidcError> {
    let segments: Vec<&str> = token.split('.').collect();
    match segments.as_slice() {
        [header, payload, signature]
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok((header, payload))
        }
        [_, _, _] => Err(OidcError::MalformedToken(
            "token has an empty segment".to_string(),
        )),
        _ => Err(OidcError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        ))),
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Map<String, Value>, OidcError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| OidcError::MalformedToken(format!("{name} is not base64url: {e}")))?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(OidcError::MalformedToken(format!(
            "{name} is not a JSON object"
        ))),
        Err(e) => Err(OidcError::MalformedToken(format!(
            "{name} is not valid JSON: {e}"
        ))),
    }
}

/// Read an optional NumericDate claim. `null` counts as absent.
fn numeric_claim(payload: &Map<String, Value>, name: &str) -> Result<Option<f64>, OidcError> {
    match payload.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            OidcError::TokenVerification(format!("'{name}' claim is not numeric"))
        }),
    }
}
