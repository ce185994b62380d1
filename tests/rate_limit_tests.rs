//! Tests for the store-backed fixed-window rate limiter.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_json, post_json_from, test_app_with_rate_limit};
use authgate::rate_limit::RateLimitSettings;
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

fn small_limit(limit: u64, window: Duration) -> RateLimitSettings {
    RateLimitSettings { limit, window }
}

fn login_body() -> serde_json::Value {
    json!({"username": "alice", "password": "s3cret-Pass"})
}

#[tokio::test]
async fn test_exactly_limit_requests_pass() {
    let ctx = test_app_with_rate_limit(small_limit(3, Duration::from_secs(60)));

    for _ in 0..3 {
        let response = ctx
            .app
            .clone()
            .oneshot(post_json("/auth/login", login_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let denied = ctx
        .app
        .clone()
        .oneshot(post_json("/auth/login", login_body()))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

    let body = body_json(denied).await;
    assert_eq!(body["statusCode"], 429);
    assert_eq!(body["message"], "Too Many Requests");
    assert_eq!(body["path"], "/auth/login");
}

#[tokio::test]
async fn test_failed_attempts_count_toward_the_limit() {
    let ctx = test_app_with_rate_limit(small_limit(2, Duration::from_secs(60)));
    let wrong = json!({"username": "alice", "password": "wrong"});

    for _ in 0..2 {
        let response = ctx
            .app
            .clone()
            .oneshot(post_json("/auth/login", wrong.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let denied = ctx
        .app
        .clone()
        .oneshot(post_json("/auth/login", wrong))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_limit_is_per_client() {
    let ctx = test_app_with_rate_limit(small_limit(1, Duration::from_secs(60)));

    let first = ctx
        .app
        .clone()
        .oneshot(post_json_from("/auth/login", "203.0.113.1", login_body()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let denied = ctx
        .app
        .clone()
        .oneshot(post_json_from("/auth/login", "203.0.113.1", login_body()))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client has its own counter.
    let other = ctx
        .app
        .clone()
        .oneshot(post_json_from("/auth/login", "203.0.113.2", login_body()))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_limit_is_per_endpoint() {
    let ctx = test_app_with_rate_limit(small_limit(1, Duration::from_secs(60)));

    let login = ctx
        .app
        .clone()
        .oneshot(post_json("/auth/login", login_body()))
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::OK);

    // The same client hitting another endpoint is not throttled by the
    // login counter.
    let refresh = ctx
        .app
        .clone()
        .oneshot(post_json("/auth/refresh", json!({"refresh_token": "x"})))
        .await
        .unwrap();
    assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);

    let denied = ctx
        .app
        .clone()
        .oneshot(post_json("/auth/login", login_body()))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_window_expiry_resets_counter() {
    let ctx = test_app_with_rate_limit(small_limit(1, Duration::from_millis(50)));

    let first = ctx
        .app
        .clone()
        .oneshot(post_json("/auth/login", login_body()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let denied = ctx
        .app
        .clone()
        .oneshot(post_json("/auth/login", login_body()))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(Duration::from_millis(80)).await;

    let after_window = ctx
        .app
        .clone()
        .oneshot(post_json("/auth/login", login_body()))
        .await
        .unwrap();
    assert_eq!(after_window.status(), StatusCode::OK);
}
