//! Error types for oidc-guard

use std::io;

use thiserror::Error;

use crate::oidc::OidcError;

/// Result type alias for oidc-guard
pub type Result<T> = std::result::Result<T, Error>;

/// Process-level errors (startup, configuration, serving).
///
/// Token verification failures are [`OidcError`]; they only show up here when a
/// command surfaces one directly (e.g. `oidc-guard discover`).
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Trust-chain or token error
    #[error(transparent)]
    Oidc(#[from] OidcError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
