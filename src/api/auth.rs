//! Authentication endpoints.
//!
//! - POST `/register` - Create a directory user and return a token pair
//! - POST `/login` - Check credentials and return a token pair
//! - POST `/refresh` - Exchange a refresh token for a new pair
//! - POST `/logout` - Revoke the current session (authenticated)

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{AuthUser, HasAuthState};
use crate::directory::CreateUser;
use crate::jwt::JwtConfig;
use crate::sessions::SessionManager;
use crate::store::SessionStore;

#[derive(Clone)]
pub struct AuthState {
    pub sessions: Arc<SessionManager>,
    pub jwt: Arc<JwtConfig>,
    pub store: Arc<dyn SessionStore>,
}

impl HasAuthState for AuthState {
    fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
    email: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Create a new user and establish their first session.
async fn register(
    State(state): State<AuthState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_register(&body)?;

    let pair = state
        .sessions
        .register(&CreateUser {
            username: body.username,
            password: body.password,
            email: body.email,
            first_name: body.first_name,
            last_name: body.last_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(pair)))
}

/// Check credentials and establish a session.
async fn login(
    State(state): State<AuthState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = state
        .sessions
        .validate_credentials(&body.username, &body.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let pair = state.sessions.login(&identity).await?;
    Ok(Json(pair))
}

/// Exchange a refresh token for a new pair. Any failure is a generic
/// 401; the response never reveals why the token was rejected.
async fn refresh(
    State(state): State<AuthState>,
    Json(body): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state.sessions.refresh(&body.refresh_token).await?;
    Ok(Json(pair))
}

/// Revoke the caller's session. Requires a valid access token.
async fn logout(
    State(state): State<AuthState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(&claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Registration validation, mirroring the directory's own rules so
/// obviously bad requests do not cross the wire.
fn validate_register(body: &RegisterRequest) -> Result<(), ApiError> {
    if body.username.len() < 4 {
        return Err(ApiError::bad_request(
            "Username must be at least 4 characters",
        ));
    }
    if body.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }
    let has_upper = body.password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = body.password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit_or_symbol = body
        .password
        .chars()
        .any(|c| c.is_ascii_digit() || !c.is_alphanumeric());
    if !has_upper || !has_lower || !has_digit_or_symbol {
        return Err(ApiError::bad_request(
            "Password must contain uppercase, lowercase, number/special character",
        ));
    }
    if !body.email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}
