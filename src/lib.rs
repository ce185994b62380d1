pub mod api;
pub mod auth;
pub mod cli;
pub mod directory;
pub mod jwt;
pub mod rate_limit;
pub mod service_auth;
pub mod sessions;
pub mod store;
pub mod translate;

use api::{AuthState, create_api_router, error_context};
use axum::{Router, middleware};
use directory::UserDirectory;
use jwt::JwtConfig;
use rate_limit::{RateLimitSettings, RateLimitState, rate_limit};
use sessions::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use store::SessionStore;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Shared session store (single source of truth across instances)
    pub store: Arc<dyn SessionStore>,
    /// User directory backend, injected explicitly
    pub directory: Arc<dyn UserDirectory>,
    /// Per-kind token signing configuration
    pub jwt: Arc<JwtConfig>,
    /// Per-client per-endpoint rate limiting
    pub rate_limit: RateLimitSettings,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let sessions = Arc::new(SessionManager::new(
        config.jwt.clone(),
        config.store.clone(),
        config.directory.clone(),
    ));

    let auth_state = AuthState {
        sessions,
        jwt: config.jwt.clone(),
        store: config.store.clone(),
    };

    let rate_limit_state = RateLimitState {
        store: config.store.clone(),
        settings: config.rate_limit,
    };

    // error_context is layered last so it wraps everything, including
    // rate limit rejections, and can stamp the request path onto error
    // bodies.
    create_api_router(auth_state)
        .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit))
        .layer(middleware::from_fn(error_context))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
