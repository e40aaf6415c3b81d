//! RSA public-key reconstruction from JWK `n`/`e` parameters

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;

use super::jwks::JwkEntry;
use super::{OidcError, decode_b64url};

/// Smallest modulus the RS256 backend accepts.
const MIN_MODULUS_BITS: usize = 2048;
/// Largest modulus the RS256 backend accepts.
const MAX_MODULUS_BITS: usize = 8192;

/// RSA public key material rebuilt from one JWK.
///
/// Derived per verification and never cached.
#[derive(Clone)]
pub struct PublicKey {
    decoding_key: DecodingKey,
    modulus_bits: usize,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("modulus_bits", &self.modulus_bits)
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    /// Build the key for an indexed JWK.
    ///
    /// Only RSA keys are accepted; a key that pins a different `alg` is refused.
    pub fn from_jwk(jwk: &JwkEntry) -> Result<Self, OidcError> {
        if !jwk.kty.is_empty() && jwk.kty != "RSA" {
            return Err(OidcError::KeyConstruction(format!(
                "key {} has type {}, expected RSA",
                jwk.kid, jwk.kty
            )));
        }
        if let Some(alg) = jwk.alg.as_deref().filter(|alg| *alg != "RS256") {
            return Err(OidcError::KeyConstruction(format!(
                "key {} is pinned to {alg}",
                jwk.kid
            )));
        }
        Self::from_components(&jwk.n, &jwk.e)
    }

    /// Build a key from base64url-encoded modulus and exponent.
    pub fn from_components(n: &str, e: &str) -> Result<Self, OidcError> {
        let modulus = decode_component("n", n)?;
        let exponent = decode_component("e", e)?;

        let modulus_bits = bit_length(&modulus);
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&modulus_bits) {
            return Err(OidcError::KeyConstruction(format!(
                "modulus is {modulus_bits} bits, expected {MIN_MODULUS_BITS}..={MAX_MODULUS_BITS}"
            )));
        }
        if modulus.last().is_some_and(|b| b & 1 == 0) {
            return Err(OidcError::KeyConstruction("modulus is even".to_string()));
        }

        if exponent.len() > 4 {
            return Err(OidcError::KeyConstruction(format!(
                "exponent is {} bytes, at most 4 supported",
                exponent.len()
            )));
        }
        let exponent_value = exponent
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        if exponent_value < 3 || exponent_value % 2 == 0 {
            return Err(OidcError::KeyConstruction(format!(
                "exponent {exponent_value} is not a valid RSA public exponent"
            )));
        }

        let decoding_key = DecodingKey::from_rsa_components(
            &URL_SAFE_NO_PAD.encode(&modulus),
            &URL_SAFE_NO_PAD.encode(&exponent),
        )
        .map_err(|e| OidcError::KeyConstruction(e.to_string()))?;

        Ok(Self {
            decoding_key,
            modulus_bits,
        })
    }

    /// Size of the modulus in bits
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.modulus_bits
    }

    /// Verify the RS256 signature of a compact token against this key.
    ///
    /// Only the signature over `header.payload` is checked here. Claims are left
    /// to the caller.
    pub fn verify_signature(&self, token: &str) -> Result<(), OidcError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        jsonwebtoken::decode::<Value>(token, &self.decoding_key, &validation)
            .map(|_| ())
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => {
                    OidcError::TokenVerification("signature does not match".to_string())
                }
                _ => OidcError::TokenVerification(e.to_string()),
            })
    }
}

/// Decode one big-endian component and drop its leading zero octets.
fn decode_component(name: &str, encoded: &str) -> Result<Vec<u8>, OidcError> {
    if encoded.is_empty() {
        return Err(OidcError::KeyConstruction(format!("missing '{name}'")));
    }
    let mut bytes = decode_b64url(encoded)
        .map_err(|e| OidcError::KeyConstruction(format!("'{name}' is not base64url: {e}")))?;

    let leading = bytes.iter().take_while(|b| **b == 0).count();
    bytes.drain(..leading);
    if bytes.is_empty() {
        return Err(OidcError::KeyConstruction(format!("'{name}' is zero")));
    }
    Ok(bytes)
}

/// Number of significant bits in a big-endian unsigned integer without leading zeros.
fn bit_length(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(first) => (bytes.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    }
}
