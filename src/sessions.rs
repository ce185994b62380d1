//! Token lifecycle orchestration: login, register, refresh, logout.
//!
//! The session store is the single source of truth for which refresh
//! token is redeemable and which access token is live per user. Login
//! always overwrites (last login wins); refresh rotation installs the
//! new token with a compare-and-swap keyed on the presented one, so of
//! two concurrent refreshes redeeming the same prior token exactly one
//! wins. The loser is indistinguishable from a replay.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::directory::{CreateUser, DirectoryError, Identity, UserDirectory};
use crate::jwt::{JwtConfig, JwtError, TokenPair};
use crate::store::{SessionRecord, SessionStore, StoreError};

/// gRPC NOT_FOUND, the code the directory answers for unknown users.
const CODE_NOT_FOUND: i32 = 5;

/// Authentication flow errors.
///
/// `InvalidCredentials` and `InvalidRefreshToken` carry fixed messages
/// that never distinguish expired from forged from rotated-away, so the
/// external response cannot be used as a verification oracle.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("Token has been revoked")]
    RevokedToken,
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
}

/// Orchestrates the token protocol against the store and the directory.
///
/// Both collaborators are injected at construction; there is no global
/// client handle and no hidden "not yet connected" state here.
pub struct SessionManager {
    jwt: Arc<JwtConfig>,
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn UserDirectory>,
}

impl SessionManager {
    pub fn new(
        jwt: Arc<JwtConfig>,
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            jwt,
            store,
            directory,
        }
    }

    /// Check a username/password pair against the directory.
    ///
    /// `Ok(None)` is "the directory answered: wrong credentials" and is
    /// the caller's cue for a 401. A directory outage is an error and
    /// must never be reported as wrong credentials.
    pub async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError> {
        Ok(self.directory.validate_credentials(username, password).await?)
    }

    /// Create a directory user and establish their first session.
    pub async fn register(&self, user: &CreateUser) -> Result<TokenPair, AuthError> {
        let identity = self.directory.create(user).await?;
        debug!(user = %identity.id, "user registered");
        self.login(&identity).await
    }

    /// Establish a session for an authenticated identity.
    ///
    /// No prior-session read: the new refresh and session records
    /// overwrite whatever was there, which force-invalidates any
    /// previous device's refresh token. The previous access token is
    /// not blacklisted; only explicit logout does that.
    pub async fn login(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        let (pair, access_expires_at) = self.jwt.issue_pair(identity)?;

        self.store
            .put_refresh_token(
                &identity.id,
                &pair.refresh_token,
                Duration::from_secs(self.jwt.refresh_lifetime_secs()),
            )
            .await?;
        self.store
            .put_session(
                &identity.id,
                &SessionRecord {
                    username: identity.username.clone(),
                    roles: identity.roles.clone(),
                    access_token: pair.access_token.clone(),
                    expires_at: access_expires_at,
                },
                Duration::from_secs(self.jwt.access_lifetime_secs()),
            )
            .await?;

        debug!(user = %identity.id, "session established");
        Ok(pair)
    }

    /// Redeem a refresh token for a new pair, rotating the old one out.
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair, AuthError> {
        // Signature/expiry check with the refresh-specific key. All
        // failures collapse into the generic rejection.
        let claims = self
            .jwt
            .verify_refresh(presented)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        // Replay/rotation guard: only the stored token is redeemable.
        let stored = self.store.refresh_token(&claims.sub).await?;
        if stored.as_deref() != Some(presented) {
            warn!(user = %claims.sub, "refresh token not current");
            return Err(AuthError::InvalidRefreshToken);
        }

        // Roles or username may have changed since issuance; the old
        // payload is never trusted for authorization-relevant fields.
        let identity = match self.directory.find_one(&claims.sub).await {
            Ok(identity) => identity,
            Err(e) if e.is_code(CODE_NOT_FOUND) => {
                warn!(user = %claims.sub, "refresh for unknown user");
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => return Err(e.into()),
        };

        let (pair, access_expires_at) = self.jwt.issue_pair(&identity)?;

        let swapped = self
            .store
            .swap_refresh_token(
                &identity.id,
                presented,
                &pair.refresh_token,
                Duration::from_secs(self.jwt.refresh_lifetime_secs()),
            )
            .await?;
        if !swapped {
            // A concurrent refresh won the rotation.
            warn!(user = %identity.id, "lost refresh rotation race");
            return Err(AuthError::InvalidRefreshToken);
        }

        self.store
            .put_session(
                &identity.id,
                &SessionRecord {
                    username: identity.username.clone(),
                    roles: identity.roles.clone(),
                    access_token: pair.access_token.clone(),
                    expires_at: access_expires_at,
                },
                Duration::from_secs(self.jwt.access_lifetime_secs()),
            )
            .await?;

        debug!(user = %identity.id, "tokens rotated");
        Ok(pair)
    }

    /// Tear down a user's session.
    ///
    /// Idempotent: with no session record there is nothing live to
    /// blacklist and the deletes are no-ops.
    pub async fn logout(&self, user_id: &str) -> Result<(), AuthError> {
        if let Some(session) = self.store.session(user_id).await? {
            let remaining = session.expires_at.saturating_sub(unix_now());
            if remaining > 0 {
                self.store
                    .blacklist_token(&session.access_token, Duration::from_secs(remaining))
                    .await?;
            }
        }

        self.store.delete_refresh_token(user_id).await?;
        self.store.delete_session(user_id).await?;
        debug!(user = %user_id, "session revoked");
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
