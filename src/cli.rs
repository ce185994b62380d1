//! CLI argument parsing, validation, and startup helpers.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use crate::jwt::{JwtSecrets, TokenLifetimes};
use crate::store::{RedisStore, SessionStore};

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "authgate",
    about = "Authentication gateway for RPC backends"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000", env = "PORT")]
    pub port: u16,

    /// Redis URL for the shared session store
    #[arg(long, default_value = "redis://127.0.0.1:6379", env = "REDIS_URL")]
    pub redis_url: String,

    /// gRPC endpoint of the user directory service
    #[arg(long, default_value = "http://127.0.0.1:5052", env = "USERS_SERVICE_URL")]
    pub directory_url: String,

    /// Caller name stamped into outbound service tokens
    #[arg(long, default_value = "api-gateway")]
    pub service_name: String,

    /// Access token lifetime in seconds
    #[arg(long, default_value = "900")]
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, default_value = "604800")]
    pub refresh_token_ttl: u64,

    /// Service token lifetime in seconds
    #[arg(long, default_value = "3600")]
    pub service_token_ttl: u64,

    /// Requests allowed per client per endpoint per window
    #[arg(long, default_value = "100")]
    pub rate_limit: u64,

    /// Rate limit window in seconds
    #[arg(long, default_value = "60")]
    pub rate_window: u64,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn token_lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access_secs: self.access_token_ttl,
            refresh_secs: self.refresh_token_ttl,
            service_secs: self.service_token_ttl,
        }
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the three per-kind signing secrets from the environment.
/// Returns None and logs an error if any is missing or too short.
pub fn load_jwt_secrets() -> Option<JwtSecrets> {
    Some(JwtSecrets {
        access: load_secret("JWT_ACCESS_SECRET")?,
        refresh: load_secret("JWT_REFRESH_SECRET")?,
        service: load_secret("JWT_SERVICE_SECRET")?,
    })
}

fn load_secret(name: &str) -> Option<Vec<u8>> {
    let Ok(secret) = std::env::var(name) else {
        error!("{} is required. Set it in the environment", name);
        return None;
    };

    // Clear the environment variable to prevent leaking.
    // SAFETY: We're single-threaded at this point during startup,
    // and no other code is reading this environment variable.
    unsafe { std::env::remove_var(name) };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            name, MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret.into_bytes())
}

/// Connect the Redis session store, logging errors if it fails.
pub async fn connect_store(url: &str) -> Option<Arc<dyn SessionStore>> {
    match RedisStore::connect(url).await {
        Ok(store) => {
            info!(url = %url, "Session store connected");
            Some(Arc::new(store))
        }
        Err(e) => {
            error!(url = %url, error = %e, "Failed to connect session store");
            None
        }
    }
}
