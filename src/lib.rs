//! oidc-guard
//!
//! OpenID Connect bearer-token authentication for axum services.
//!
//! # Features
//!
//! - **Discovery**: provider metadata fetched from `/.well-known/openid-configuration` and cached
//! - **JWKS caching**: signing keys indexed by `kid`, refreshed when an unknown `kid` shows up
//! - **RS256 only**: `alg` is pinned; `none` and HMAC confusion are rejected up front
//! - **Opaque failures**: every verification error becomes the same 401
//! - **Pluggable**: cache store, document fetcher and clock sit behind traits
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use oidc_guard::{auth::Authenticator, cache::InMemoryCache, config::Config, oidc::TrustChain};
//!
//! # fn main() -> oidc_guard::Result<()> {
//! let config = Config::load(None)?;
//! let chain = TrustChain::from_config(&config.oidc, Arc::new(InMemoryCache::new()))?;
//! let authenticator = Arc::new(Authenticator::new(chain.verifier.clone(), &config.auth));
//! let app = oidc_guard::server::build_router(authenticator);
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod oidc;
pub mod server;

#[cfg(test)]
#[allow(missing_docs)]
pub(crate) mod test_support;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` selects `json` output;
/// anything else gives human-readable text.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("failed to install tracing subscriber: {e}")))
}
