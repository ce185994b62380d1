//! User directory backend interface.
//!
//! The directory owns user records and password verification; the
//! gateway only consumes it over gRPC. The seam is the
//! [`UserDirectory`] trait so the lifecycle manager can be exercised
//! against an in-memory fake. [`GrpcDirectory`] is the production
//! implementation: hand-rolled unary calls over prost wire messages
//! matching the directory's `users.proto`, with the service-token
//! interceptor stamped on every call.

use async_trait::async_trait;
use thiserror::Error;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, GrpcMethod, Request, Status};

use crate::service_auth::ServiceTokenInterceptor;
use crate::translate::RpcFailure;

/// Minimal projection of a user needed to mint tokens. Owned by the
/// directory; never cached by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub roles: Vec<String>,
}

/// Fields for creating a new directory user.
#[derive(Debug, Clone, Default)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Errors surfaced by directory calls.
///
/// `Unavailable` means the backend could not be reached (retriable
/// infrastructure failure); it is deliberately distinct from any
/// answer the directory actually gave.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
    #[error("user directory call failed: {0}")]
    Rpc(RpcFailure),
}

impl From<Status> for DirectoryError {
    fn from(status: Status) -> Self {
        if status.code() == Code::Unavailable {
            DirectoryError::Unavailable(status.message().to_string())
        } else {
            DirectoryError::Rpc(RpcFailure::from_status(&status))
        }
    }
}

impl DirectoryError {
    /// Whether this failure carries the given gRPC code.
    pub fn is_code(&self, code: i32) -> bool {
        matches!(self, DirectoryError::Rpc(failure) if failure.code == code)
    }
}

/// The directory operations the gateway consumes.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Check a username/password pair. `Ok(None)` means the directory
    /// answered and the credentials are wrong; an `Err` means it could
    /// not answer. Callers must never conflate the two.
    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, DirectoryError>;

    /// Create a new user. Fails with ALREADY_EXISTS on duplicates.
    async fn create(&self, user: &CreateUser) -> Result<Identity, DirectoryError>;

    /// Fetch the current identity for a user id.
    async fn find_one(&self, id: &str) -> Result<Identity, DirectoryError>;
}

// Wire messages for users.UsersService, tags matching the directory's
// proto definition.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserByIdMessage {
    #[prost(string, tag = "1")]
    pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserMessage {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub username: String,
    #[prost(string, tag = "3")]
    pub email: String,
    #[prost(string, repeated, tag = "4")]
    pub roles: Vec<String>,
    #[prost(string, tag = "5")]
    pub first_name: String,
    #[prost(string, tag = "6")]
    pub last_name: String,
    #[prost(bool, tag = "7")]
    pub is_active: bool,
    #[prost(string, tag = "8")]
    pub created_at: String,
    #[prost(string, tag = "9")]
    pub updated_at: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateUserMessage {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub email: String,
    #[prost(string, tag = "3")]
    pub password: String,
    #[prost(string, tag = "4")]
    pub first_name: String,
    #[prost(string, tag = "5")]
    pub last_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateCredentialsRequest {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateCredentialsResponse {
    #[prost(bool, tag = "1")]
    pub is_valid: bool,
    #[prost(message, optional, tag = "2")]
    pub user: Option<UserMessage>,
}

impl From<UserMessage> for Identity {
    fn from(user: UserMessage) -> Self {
        Identity {
            id: user.id,
            username: user.username,
            roles: user.roles,
        }
    }
}

/// gRPC client for the directory, authenticated with service tokens.
#[derive(Clone)]
pub struct GrpcDirectory {
    grpc: tonic::client::Grpc<InterceptedService<Channel, ServiceTokenInterceptor>>,
}

impl GrpcDirectory {
    /// Build a client over a lazily connected channel. The gateway may
    /// start before the directory does; calls made while the backend is
    /// unreachable surface as [`DirectoryError::Unavailable`].
    pub fn connect_lazy(
        url: &str,
        interceptor: ServiceTokenInterceptor,
    ) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(url.to_string())?.connect_lazy();
        Ok(Self {
            grpc: tonic::client::Grpc::new(InterceptedService::new(channel, interceptor)),
        })
    }

    async fn unary<M1, M2>(
        &self,
        method: &'static str,
        path: &'static str,
        message: M1,
    ) -> Result<M2, Status>
    where
        M1: prost::Message + Send + Sync + 'static,
        M2: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.grpc.clone();
        grpc.ready().await.map_err(|e| {
            let e: Box<dyn std::error::Error + Send + Sync> = e.into();
            Status::unavailable(format!("directory was not ready: {}", e))
        })?;

        let codec = tonic::codec::ProstCodec::default();
        let mut request = Request::new(message);
        request
            .extensions_mut()
            .insert(GrpcMethod::new("users.UsersService", method));

        let response = grpc
            .unary(request, PathAndQuery::from_static(path), codec)
            .await?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl UserDirectory for GrpcDirectory {
    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, DirectoryError> {
        let response: ValidateCredentialsResponse = self
            .unary(
                "ValidateCredentials",
                "/users.UsersService/ValidateCredentials",
                ValidateCredentialsRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;

        if !response.is_valid {
            return Ok(None);
        }
        Ok(response.user.map(Identity::from))
    }

    async fn create(&self, user: &CreateUser) -> Result<Identity, DirectoryError> {
        let created: UserMessage = self
            .unary(
                "Create",
                "/users.UsersService/Create",
                CreateUserMessage {
                    username: user.username.clone(),
                    email: user.email.clone(),
                    password: user.password.clone(),
                    first_name: user.first_name.clone(),
                    last_name: user.last_name.clone(),
                },
            )
            .await?;
        Ok(Identity::from(created))
    }

    async fn find_one(&self, id: &str) -> Result<Identity, DirectoryError> {
        let user: UserMessage = self
            .unary(
                "FindOne",
                "/users.UsersService/FindOne",
                UserByIdMessage { id: id.to_string() },
            )
            .await?;
        Ok(Identity::from(user))
    }
}
