//! Access-token verification for authenticated routes.
//!
//! A Bearer access token is accepted only if its signature is valid,
//! it has not expired, its kind is `access`, and it is not on the
//! revocation blacklist. All four checks are mandatory; skipping the
//! blacklist lookup would reopen a revoked token until natural expiry.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::error;

use crate::api::error::error_response;
use crate::jwt::{JwtConfig, UserClaims};
use crate::store::{SessionStore, StoreError};

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::trim)
}

/// Trait for state types that support access-token authentication.
pub trait HasAuthState {
    fn jwt(&self) -> &JwtConfig;
    fn store(&self) -> &Arc<dyn SessionStore>;
}

/// Extractor for endpoints that require an authenticated user.
pub struct AuthUser(pub UserClaims);

impl<S> FromRequestParts<S> for AuthUser
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(&parts.headers).ok_or(AuthRejection::NotAuthenticated)?;

        let claims = state
            .jwt()
            .verify_access(token)
            .map_err(|_| AuthRejection::InvalidToken)?;

        let revoked = state
            .store()
            .is_blacklisted(token)
            .await
            .map_err(AuthRejection::Store)?;
        if revoked {
            return Err(AuthRejection::TokenRevoked);
        }

        Ok(AuthUser(claims))
    }
}

/// Authentication rejections, rendered in the gateway's error shape.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    InvalidToken,
    TokenRevoked,
    Store(StoreError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        use axum::http::StatusCode;
        let (status, message) = match self {
            Self::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Not authenticated"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            Self::TokenRevoked => (StatusCode::UNAUTHORIZED, "Token has been revoked"),
            Self::Store(StoreError::Unavailable(e)) => {
                error!(error = %e, "Session store unavailable during auth");
                (StatusCode::SERVICE_UNAVAILABLE, "Session store unavailable")
            }
            Self::Store(StoreError::Protocol(e)) => {
                error!(error = %e, "Session store error during auth");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        error_response(status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_present() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_token_missing_header() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(bearer_token(&headers), None);
    }
}
