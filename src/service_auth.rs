//! Service-to-service credential plumbing.
//!
//! Outbound: every backend call carries `authorization: Bearer
//! <service-token>` in its metadata, minted by the interceptor from the
//! gateway's own name. Inbound: [`ServiceGuard`] validates such
//! metadata the same way a backend would, rejecting anything that is
//! not an unrevoked token of kind `service`.

use std::sync::Arc;

use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::jwt::{JwtConfig, ServiceClaims};
use crate::store::SessionStore;

/// Stamps a freshly minted service token into outbound call metadata.
#[derive(Clone)]
pub struct ServiceTokenInterceptor {
    jwt: Arc<JwtConfig>,
    service_name: String,
}

impl ServiceTokenInterceptor {
    pub fn new(jwt: Arc<JwtConfig>, service_name: impl Into<String>) -> Self {
        Self {
            jwt,
            service_name: service_name.into(),
        }
    }
}

impl Interceptor for ServiceTokenInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let issued = self
            .jwt
            .issue_service(&self.service_name)
            .map_err(|e| Status::internal(format!("failed to mint service token: {}", e)))?;

        let value = MetadataValue::try_from(format!("Bearer {}", issued.token))
            .map_err(|_| Status::internal("service token is not valid metadata"))?;
        request.metadata_mut().insert("authorization", value);
        Ok(request)
    }
}

/// Validates inbound service credentials from call metadata.
///
/// A valid access or refresh token must never pass this check; the
/// kind test is explicit and does not rely on the secrets differing.
pub struct ServiceGuard {
    jwt: Arc<JwtConfig>,
    store: Arc<dyn SessionStore>,
}

impl ServiceGuard {
    pub fn new(jwt: Arc<JwtConfig>, store: Arc<dyn SessionStore>) -> Self {
        Self { jwt, store }
    }

    pub async fn check(&self, metadata: &MetadataMap) -> Result<ServiceClaims, Status> {
        let value = metadata
            .get("authorization")
            .ok_or_else(|| Status::unauthenticated("No authorization token provided"))?
            .to_str()
            .map_err(|_| Status::unauthenticated("Invalid authorization metadata"))?;
        let token = value.strip_prefix("Bearer ").unwrap_or(value);

        let claims = self
            .jwt
            .verify_service(token)
            .map_err(|_| Status::unauthenticated("Invalid token"))?;

        let revoked = self
            .store
            .is_blacklisted(token)
            .await
            .map_err(|e| Status::unavailable(e.to_string()))?;
        if revoked {
            return Err(Status::unauthenticated("Token has been revoked"));
        }

        Ok(claims)
    }
}
