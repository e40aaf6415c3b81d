//! Request authentication
//!
//! Every trust-chain failure is collapsed into [`AuthenticationFailure`], which
//! renders as a bare 401. The specific [`OidcError`](crate::oidc::OidcError)
//! kind is only ever logged.

pub mod middleware;
pub mod principal;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

pub use middleware::{Authenticator, auth_middleware};
pub use principal::Principal;

/// The single outward-facing authentication error
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unauthorized")]
pub struct AuthenticationFailure;

impl IntoResponse for AuthenticationFailure {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({ "error": "unauthorized" })),
        )
            .into_response()
    }
}
