//! Session store: refresh records, session records, revocation
//! blacklist, and rate counters, each with explicit TTLs.
//!
//! The store is the single source of truth shared by every gateway
//! instance; nothing here is ever cached in-process. Production runs
//! against Redis, tests against the in-memory backend.

mod memory;
mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Key prefixes shared by every backend.
const REFRESH_PREFIX: &str = "refresh:";
const SESSION_PREFIX: &str = "session:";
const BLACKLIST_PREFIX: &str = "blacklist:";
const RATE_LIMIT_PREFIX: &str = "ratelimit:";

pub(crate) fn refresh_key(user_id: &str) -> String {
    format!("{}{}", REFRESH_PREFIX, user_id)
}

pub(crate) fn session_key(user_id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, user_id)
}

pub(crate) fn blacklist_key(token: &str) -> String {
    format!("{}{}", BLACKLIST_PREFIX, token)
}

pub(crate) fn rate_limit_key(client: &str, endpoint: &str) -> String {
    format!("{}{}:{}", RATE_LIMIT_PREFIX, client, endpoint)
}

/// A user's live session: the access token currently in circulation
/// and the claims it was minted from. Used on logout to locate the
/// token to blacklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub username: String,
    pub roles: Vec<String>,
    pub access_token: String,
    /// Unix timestamp at which the access token expires.
    pub expires_at: u64,
}

/// Errors surfaced by session store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached. Retriable infrastructure failure.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    /// The store answered but the operation or payload was malformed.
    #[error("session store error: {0}")]
    Protocol(String),
}

/// Key-value store abstraction over the session state.
///
/// Single-key overwrite is the only write granularity; no operation
/// spans keys transactionally. `swap_refresh_token` is the one
/// conditional write, used to make refresh rotation single-winner.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store the single currently-valid refresh token for a user,
    /// overwriting any prior record.
    async fn put_refresh_token(
        &self,
        user_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Fetch the currently-valid refresh token for a user.
    async fn refresh_token(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    /// Replace the refresh token only if the stored value still equals
    /// `expected`. Returns false when another writer got there first.
    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove the refresh record for a user.
    async fn delete_refresh_token(&self, user_id: &str) -> Result<(), StoreError>;

    /// Store the session record for a user, overwriting any prior one.
    async fn put_session(
        &self,
        user_id: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Fetch a user's session record.
    async fn session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Remove the session record for a user.
    async fn delete_session(&self, user_id: &str) -> Result<(), StoreError>;

    /// Blacklist an access token for the remainder of its lifetime.
    async fn blacklist_token(&self, token: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Whether an access token has been revoked.
    async fn is_blacklisted(&self, token: &str) -> Result<bool, StoreError>;

    /// Atomically increment and read the request counter for
    /// `(client, endpoint)`. The first increment of a window sets the
    /// key's TTL to the window length; expiry resets the count.
    async fn incr_counter(
        &self,
        client: &str,
        endpoint: &str,
        window: Duration,
    ) -> Result<u64, StoreError>;
}
