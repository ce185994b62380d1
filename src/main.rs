use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use authgate::cli::{Args, connect_store, init_logging, load_jwt_secrets};
use authgate::directory::GrpcDirectory;
use authgate::jwt::JwtConfig;
use authgate::rate_limit::RateLimitSettings;
use authgate::service_auth::ServiceTokenInterceptor;
use authgate::{ServerConfig, create_app};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(secrets) = load_jwt_secrets() else {
        std::process::exit(1);
    };
    let jwt = Arc::new(JwtConfig::new(&secrets, args.token_lifetimes()));

    let Some(store) = connect_store(&args.redis_url).await else {
        std::process::exit(1);
    };

    // The directory channel connects lazily: the gateway may come up
    // before its backends, and calls made in the meantime surface as
    // 503 rather than crashing startup.
    let interceptor = ServiceTokenInterceptor::new(jwt.clone(), args.service_name.clone());
    let directory = match GrpcDirectory::connect_lazy(&args.directory_url, interceptor) {
        Ok(directory) => directory,
        Err(e) => {
            error!(url = %args.directory_url, error = %e, "Invalid directory endpoint");
            std::process::exit(1);
        }
    };

    let config = ServerConfig {
        store,
        directory: Arc::new(directory),
        jwt,
        rate_limit: RateLimitSettings {
            limit: args.rate_limit,
            window: Duration::from_secs(args.rate_window),
        },
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap();
    let app = create_app(&config);

    info!(address = %local_addr, "Listening");

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
