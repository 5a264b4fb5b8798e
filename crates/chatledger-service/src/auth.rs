//! Authentication extractors.
//!
//! Two independent pieces of request context:
//!
//! - [`SecretAuth`]: the optional shared-secret gate. When `AUTH_SECRET_KEY`
//!   is configured, requests must carry it as a bearer token.
//! - [`Identity`]: the quota identity, taken from the username of an HTTP
//!   Basic `Authorization` header (deployments put a Basic-auth reverse
//!   proxy in front and the service inherits its usernames).

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::Engine;

use crate::error::ApiError;
use crate::state::AppState;

/// Proof that the shared-secret gate passed (or is disabled).
#[derive(Debug, Clone, Copy)]
pub struct SecretAuth;

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for SecretAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.auth_secret_key.as_deref() else {
            return Ok(Self);
        };

        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        if token == secret {
            Ok(Self)
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// The requesting user's quota identity, when one was presented.
#[derive(Debug, Clone)]
pub struct Identity(pub Option<String>);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(basic_username(parts)))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Username from an HTTP Basic `Authorization` header.
fn basic_username(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let username = credentials.split(':').next()?.trim();
    if username.is_empty() {
        None
    } else {
        Some(username.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: &str) -> Parts {
        let request = Request::builder()
            .uri("/")
            .header(AUTHORIZATION, value)
            .body(())
            .unwrap();
        request.into_parts().0
    }

    #[test]
    fn basic_username_is_decoded() {
        let encoded = base64::engine::general_purpose::STANDARD.encode("alice:secret");
        let parts = parts_with_auth(&format!("Basic {encoded}"));
        assert_eq!(basic_username(&parts).as_deref(), Some("alice"));
    }

    #[test]
    fn bearer_header_yields_no_identity() {
        let parts = parts_with_auth("Bearer some-token");
        assert_eq!(basic_username(&parts), None);
    }

    #[test]
    fn empty_username_is_rejected() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(":password");
        let parts = parts_with_auth(&format!("Basic {encoded}"));
        assert_eq!(basic_username(&parts), None);
    }
}
