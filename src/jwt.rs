//! JWT issuance and verification for the three token kinds.
//!
//! Each kind (access, refresh, service) signs with its own secret and
//! fixed lifetime. Every payload carries an explicit `typ` claim and
//! verification checks it, so a token of one kind can never satisfy a
//! check for another even if two kinds were deployed with the same
//! secret.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::directory::Identity;

/// Token kind, carried in the `typ` claim of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived credential presented on each authenticated request.
    Access,
    /// Long-lived credential exchanged for a new pair; single-use.
    Refresh,
    /// Gateway-to-backend credential, not tied to an end user.
    Service,
}

/// Claims for access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Subject (user id from the directory).
    pub sub: String,
    /// Username at issuance time.
    pub username: String,
    /// Roles at issuance time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Token kind.
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Claims for service tokens. No subject: the credential identifies
/// the calling service, not a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceClaims {
    /// Name of the calling service.
    pub service: String,
    /// Token kind.
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// The externally returned access/refresh pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// A freshly signed token together with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Signing secrets, one per token kind.
pub struct JwtSecrets {
    pub access: Vec<u8>,
    pub refresh: Vec<u8>,
    pub service: Vec<u8>,
}

/// Token lifetimes in seconds. Configuration, not policy.
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access_secs: u64,
    pub refresh_secs: u64,
    pub service_secs: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_secs: 15 * 60,
            refresh_secs: 7 * 24 * 60 * 60,
            service_secs: 60 * 60,
        }
    }
}

struct KindKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: u64,
}

impl KindKey {
    fn new(secret: &[u8], lifetime_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime_secs,
        }
    }
}

/// Configuration for JWT operations across all token kinds.
pub struct JwtConfig {
    access: KindKey,
    refresh: KindKey,
    service: KindKey,
}

impl JwtConfig {
    pub fn new(secrets: &JwtSecrets, lifetimes: TokenLifetimes) -> Self {
        Self {
            access: KindKey::new(&secrets.access, lifetimes.access_secs),
            refresh: KindKey::new(&secrets.refresh, lifetimes.refresh_secs),
            service: KindKey::new(&secrets.service, lifetimes.service_secs),
        }
    }

    pub fn access_lifetime_secs(&self) -> u64 {
        self.access.lifetime_secs
    }

    pub fn refresh_lifetime_secs(&self) -> u64 {
        self.refresh.lifetime_secs
    }

    /// Issue an access token for a user.
    pub fn issue_access(&self, identity: &Identity) -> Result<IssuedToken, JwtError> {
        self.issue_user(identity, TokenKind::Access, &self.access)
    }

    /// Issue a refresh token for a user.
    pub fn issue_refresh(&self, identity: &Identity) -> Result<IssuedToken, JwtError> {
        self.issue_user(identity, TokenKind::Refresh, &self.refresh)
    }

    /// Issue an access/refresh pair. Returns the pair together with the
    /// access token's expiry, which the session record needs.
    pub fn issue_pair(&self, identity: &Identity) -> Result<(TokenPair, u64), JwtError> {
        let access = self.issue_access(identity)?;
        let refresh = self.issue_refresh(identity)?;
        Ok((
            TokenPair {
                access_token: access.token,
                refresh_token: refresh.token,
            },
            access.expires_at,
        ))
    }

    /// Issue a service token identifying the given caller.
    pub fn issue_service(&self, service_name: &str) -> Result<IssuedToken, JwtError> {
        let now = unix_now()?;
        let exp = now + self.service.lifetime_secs;

        let claims = ServiceClaims {
            service: service_name.to_string(),
            kind: TokenKind::Service,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.service.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
        })
    }

    /// Verify an access token: signature, expiry, and kind.
    pub fn verify_access(&self, token: &str) -> Result<UserClaims, JwtError> {
        let claims = decode_claims::<UserClaims>(token, &self.access.decoding)?;
        if claims.kind != TokenKind::Access {
            return Err(JwtError::WrongTokenKind);
        }
        Ok(claims)
    }

    /// Verify a refresh token against the refresh-specific key, so an
    /// access token can never be replayed as a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<UserClaims, JwtError> {
        let claims = decode_claims::<UserClaims>(token, &self.refresh.decoding)?;
        if claims.kind != TokenKind::Refresh {
            return Err(JwtError::WrongTokenKind);
        }
        Ok(claims)
    }

    /// Verify a service token. The kind check is explicit and not
    /// delegated to the key split.
    pub fn verify_service(&self, token: &str) -> Result<ServiceClaims, JwtError> {
        let claims = decode_claims::<ServiceClaims>(token, &self.service.decoding)?;
        if claims.kind != TokenKind::Service {
            return Err(JwtError::WrongTokenKind);
        }
        Ok(claims)
    }

    fn issue_user(
        &self,
        identity: &Identity,
        kind: TokenKind,
        key: &KindKey,
    ) -> Result<IssuedToken, JwtError> {
        let now = unix_now()?;
        let exp = now + key.lifetime_secs;

        let claims = UserClaims {
            sub: identity.id.clone(),
            username: identity.username.clone(),
            roles: identity.roles.clone(),
            kind,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &key.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
        })
    }
}

fn decode_claims<C: serde::de::DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
) -> Result<C, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let token_data =
        jsonwebtoken::decode::<C>(token, key, &validation).map_err(JwtError::Decoding)?;
    Ok(token_data.claims)
}

fn unix_now() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Token is valid but of the wrong kind for this check
    WrongTokenKind,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenKind => write!(f, "Wrong token kind"),
        }
    }
}

impl std::error::Error for JwtError {}
