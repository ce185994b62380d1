mod auth;
pub mod error;

use axum::Router;

pub use auth::AuthState;
pub use error::{ApiError, error_context};

/// Create the API router. The auth endpoints are the gateway's own;
/// proxied backend routes mount beside them.
pub fn create_api_router(state: AuthState) -> Router {
    Router::new().nest("/auth", auth::router(state))
}
