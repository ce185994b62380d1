//! Shared error handling for API endpoints.
//!
//! Every failure leaving the gateway renders as the same shape:
//! `{statusCode, message, path, timestamp}`. Handlers only decide
//! status and message; the [`error_context`] middleware fills in the
//! request path on the way out. Backend failures are translated here,
//! in one place, through the code table in [`crate::translate`].

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::directory::DirectoryError;
use crate::sessions::AuthError;
use crate::store::StoreError;
use crate::translate::{ErrorBody, RpcFailure};

/// API error type with automatic response conversion.
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    ServiceUnavailable(String),
    Internal(String),
    /// A translated backend failure; status comes from the code table.
    Upstream(RpcFailure),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            // Fixed messages: expired, forged and rotated-away must be
            // indistinguishable externally.
            AuthError::InvalidCredentials => Self::unauthorized("Invalid credentials"),
            AuthError::InvalidRefreshToken => Self::unauthorized("Invalid refresh token"),
            AuthError::RevokedToken => Self::unauthorized("Token has been revoked"),
            AuthError::Directory(DirectoryError::Unavailable(e)) => {
                error!(error = %e, "User directory unavailable");
                Self::service_unavailable("User directory unavailable")
            }
            AuthError::Directory(DirectoryError::Rpc(failure)) => Self::Upstream(failure),
            AuthError::Store(StoreError::Unavailable(e)) => {
                error!(error = %e, "Session store unavailable");
                Self::service_unavailable("Session store unavailable")
            }
            AuthError::Store(StoreError::Protocol(e)) => {
                error!(error = %e, "Session store error");
                Self::internal("Internal server error")
            }
            AuthError::Jwt(e) => {
                error!(error = %e, "Token signing failed");
                Self::internal("Failed to issue tokens")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Upstream(failure) => (failure.external_status(), failure.message),
        };
        error_response(status, message)
    }
}

/// Marker carried in response extensions so [`error_context`] can
/// rebuild the body with the request path.
#[derive(Clone)]
pub struct ErrorMeta {
    pub status: StatusCode,
    pub message: String,
}

/// Build an error response in the gateway's standard shape.
///
/// The path is not known at this point; the middleware stamps it in.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    let body = ErrorBody::new(status, message.clone(), "");
    let mut response = (status, Json(body)).into_response();
    response.extensions_mut().insert(ErrorMeta { status, message });
    response
}

/// Middleware that rewrites error responses with the request path.
pub async fn error_context(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    if let Some(meta) = response.extensions_mut().remove::<ErrorMeta>() {
        let body = ErrorBody::new(meta.status, meta.message, path);
        return (meta.status, Json(body)).into_response();
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_conflict_renders_with_table_status() {
        let err = ApiError::Upstream(RpcFailure::new(6, "Username taken"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(response.extensions().get::<ErrorMeta>().is_some());
    }

    #[test]
    fn test_unknown_upstream_code_renders_internal() {
        let err = ApiError::Upstream(RpcFailure::new(99, "strange failure"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let meta = response.extensions().get::<ErrorMeta>().unwrap();
        assert_eq!(meta.message, "strange failure");
    }

    #[test]
    fn test_auth_error_conversion_keeps_messages_generic() {
        let api: ApiError = AuthError::InvalidRefreshToken.into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let meta = response.extensions().get::<ErrorMeta>().unwrap();
        assert_eq!(meta.message, "Invalid refresh token");
    }

    #[test]
    fn test_directory_outage_renders_service_unavailable() {
        let api: ApiError =
            AuthError::Directory(DirectoryError::Unavailable("down".to_string())).into();
        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
