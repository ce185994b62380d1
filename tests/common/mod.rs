#![allow(dead_code)]

use async_trait::async_trait;
use authgate::directory::{CreateUser, DirectoryError, Identity, UserDirectory};
use authgate::jwt::{JwtConfig, JwtSecrets, TokenLifetimes};
use authgate::rate_limit::RateLimitSettings;
use authgate::store::MemoryStore;
use authgate::translate::RpcFailure;
use authgate::{ServerConfig, create_app};
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Client IP used by default in test requests; the rate limiter
/// refuses requests whose client IP cannot be determined.
pub const TEST_IP: &str = "198.51.100.7";

/// In-memory stand-in for the user directory backend.
pub struct StaticDirectory {
    users: Mutex<HashMap<String, (String, Identity)>>,
    available: AtomicBool,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn insert(&self, password: &str, identity: Identity) {
        self.users
            .lock()
            .unwrap()
            .insert(identity.username.clone(), (password.to_string(), identity));
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DirectoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable("directory down".to_string()))
        }
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, DirectoryError> {
        self.check()?;
        let users = self.users.lock().unwrap();
        Ok(users
            .get(username)
            .filter(|(stored, _)| stored == password)
            .map(|(_, identity)| identity.clone()))
    }

    async fn create(&self, user: &CreateUser) -> Result<Identity, DirectoryError> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&user.username) {
            return Err(DirectoryError::Rpc(RpcFailure::new(
                6,
                "Username or email already exists",
            )));
        }
        let identity = Identity {
            id: format!("user-{}", users.len() + 1),
            username: user.username.clone(),
            roles: vec!["user".to_string()],
        };
        users.insert(
            user.username.clone(),
            (user.password.clone(), identity.clone()),
        );
        Ok(identity)
    }

    async fn find_one(&self, id: &str) -> Result<Identity, DirectoryError> {
        self.check()?;
        let users = self.users.lock().unwrap();
        users
            .values()
            .find(|(_, identity)| identity.id == id)
            .map(|(_, identity)| identity.clone())
            .ok_or_else(|| DirectoryError::Rpc(RpcFailure::new(5, "User not found")))
    }
}

pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<StaticDirectory>,
    pub jwt: Arc<JwtConfig>,
}

/// Build the real router over in-memory collaborators. The rate limit
/// is generous so flow tests never trip it.
pub fn test_app() -> TestApp {
    test_app_with_rate_limit(RateLimitSettings {
        limit: 10_000,
        window: Duration::from_secs(60),
    })
}

pub fn test_app_with_rate_limit(settings: RateLimitSettings) -> TestApp {
    let secrets = JwtSecrets {
        access: b"access-secret-for-testing-only!!".to_vec(),
        refresh: b"refresh-secret-for-testing-only!".to_vec(),
        service: b"service-secret-for-testing-only!".to_vec(),
    };
    let jwt = Arc::new(JwtConfig::new(&secrets, TokenLifetimes::default()));
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(StaticDirectory::new());

    directory.insert(
        "s3cret-Pass",
        Identity {
            id: "user-1".to_string(),
            username: "alice".to_string(),
            roles: vec!["user".to_string()],
        },
    );

    let config = ServerConfig {
        store: store.clone(),
        directory: directory.clone(),
        jwt: jwt.clone(),
        rate_limit: settings,
    };

    TestApp {
        app: create_app(&config),
        store,
        directory,
        jwt,
    }
}

/// Build a JSON POST request from the default test client IP.
pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", TEST_IP)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Same as [`post_json`] with an explicit client IP.
pub fn post_json_from(uri: &str, ip: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// POST with a Bearer access token and no body.
pub fn post_authed(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .header("x-forwarded-for", TEST_IP)
        .body(Body::empty())
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse body")
}
