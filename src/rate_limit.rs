//! Rate limiting for gateway endpoints.
//!
//! Fixed-window counting per `(client-ip, path)`, backed by the shared
//! session store so every gateway instance sees the same window.
//! Correctness under concurrent requests rests entirely on the store's
//! atomic increment-and-read.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::api::error::error_response;
use crate::store::{SessionStore, StoreError};

/// Rate limiting configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    /// Requests allowed per client per endpoint per window.
    pub limit: u64,
    /// Window length; the counter resets when it expires.
    pub window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitState {
    pub store: Arc<dyn SessionStore>,
    pub settings: RateLimitSettings,
}

/// Middleware that counts and limits requests per client per endpoint.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ip) = extract_client_ip(&request) else {
        return error_response(StatusCode::FORBIDDEN, "Unable to determine client IP.");
    };
    let path = request.uri().path().to_string();

    match state
        .store
        .incr_counter(&ip, &path, state.settings.window)
        .await
    {
        Ok(count) if count > state.settings.limit => {
            warn!(client = %ip, path = %path, count, "Rate limit exceeded");
            error_response(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests")
        }
        Ok(_) => next.run(request).await,
        Err(StoreError::Unavailable(e)) => {
            error!(error = %e, "Session store unavailable during rate limiting");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Session store unavailable")
        }
        Err(StoreError::Protocol(e)) => {
            error!(error = %e, "Session store error during rate limiting");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Extract the client IP from `x-forwarded-for` (reverse proxy) or the
/// connection info.
fn extract_client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded_for) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            // Can contain multiple IPs; the first is the original client.
            if let Some(first_ip) = value.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return Some(ip.to_string());
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_header(value: &str) -> Request {
        axum::http::Request::builder()
            .uri("/auth/login")
            .header("x-forwarded-for", value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_ip_from_forwarded_header() {
        let request = request_with_header("203.0.113.9");
        assert_eq!(extract_client_ip(&request), Some("203.0.113.9".to_string()));
    }

    #[test]
    fn test_extract_ip_takes_first_of_chain() {
        let request = request_with_header("203.0.113.9, 10.0.0.1");
        assert_eq!(extract_client_ip(&request), Some("203.0.113.9".to_string()));
    }

    #[test]
    fn test_extract_ip_from_connect_info() {
        let mut request = axum::http::Request::builder()
            .uri("/auth/login")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("192.0.2.1:9999".parse().unwrap()));
        assert_eq!(extract_client_ip(&request), Some("192.0.2.1".to_string()));
    }

    #[test]
    fn test_extract_ip_missing() {
        let request = axum::http::Request::builder()
            .uri("/auth/login")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&request), None);
    }
}
