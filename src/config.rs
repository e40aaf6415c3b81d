//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::oidc::metadata::DEFAULT_METADATA_TTL;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Identity provider configuration
    pub oidc: OidcConfig,
    /// Request authentication configuration
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Environment variables use the `OIDC_GUARD_` prefix with `__` between
    /// nesting levels, e.g. `OIDC_GUARD_OIDC__DISCOVERY_URL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("OIDC_GUARD_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Check settings that cannot be expressed through types alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.oidc.validate()?;

        if self.auth.access_token_param.is_empty() {
            return Err(Error::Config(
                "auth.access_token_param must not be empty".to_string(),
            ));
        }
        if let Some(path) = self.auth.public_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(Error::Config(format!(
                "auth.public_paths entries must start with '/', got {path:?}"
            )));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Full URL of the provider's `/.well-known/openid-configuration`
    pub discovery_url: String,
    /// How long the discovery document stays cached
    #[serde(with = "humantime_serde")]
    pub metadata_ttl: Duration,
    /// Timeout for each discovery/JWKS request
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,
    /// Permit `http://` provider URLs (local development only)
    pub allow_insecure_http: bool,
    /// Clock skew tolerated on `exp`, `nbf` and `iat`, in seconds
    pub leeway_secs: u64,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            discovery_url: String::new(),
            metadata_ttl: DEFAULT_METADATA_TTL,
            http_timeout: Duration::from_secs(10),
            allow_insecure_http: false,
            leeway_secs: 0,
        }
    }
}

impl OidcConfig {
    fn validate(&self) -> Result<()> {
        if self.discovery_url.is_empty() {
            return Err(Error::Config("oidc.discovery_url is required".to_string()));
        }

        let url = Url::parse(&self.discovery_url)
            .map_err(|e| Error::Config(format!("oidc.discovery_url is not a valid URL: {e}")))?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {}
            "http" => {
                return Err(Error::Config(
                    "oidc.discovery_url must use https (set oidc.allow_insecure_http for local testing)"
                        .to_string(),
                ));
            }
            other => {
                return Err(Error::Config(format!(
                    "oidc.discovery_url has unsupported scheme '{other}'"
                )));
            }
        }

        if self.http_timeout.is_zero() {
            return Err(Error::Config("oidc.http_timeout must be non-zero".to_string()));
        }
        if self.metadata_ttl.is_zero() {
            return Err(Error::Config("oidc.metadata_ttl must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Request authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Path prefixes that bypass authentication
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Query/form parameter consulted when there is no bearer header
    pub access_token_param: String,
    /// Largest form body read while looking for the token parameter (bytes)
    pub max_form_body_bytes: usize,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            public_paths: default_public_paths(),
            access_token_param: "access_token".to_string(),
            max_form_body_bytes: 64 * 1024,
        }
    }
}
