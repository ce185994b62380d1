//! Redis-backed session store.
//!
//! Key layout follows the gateway's shared schema: `refresh:<user>`,
//! `session:<user>` (hash), `blacklist:<token>`, `ratelimit:<ip>:<path>`.
//! TTLs are enforced by Redis itself; expired keys simply vanish.
//! Conditional writes (refresh rotation, counter windows) run as small
//! Lua scripts so they stay atomic without client-side locking.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;

use super::{
    SessionRecord, SessionStore, StoreError, blacklist_key, rate_limit_key, refresh_key,
    session_key,
};

/// Replace KEYS[1] with ARGV[2] only when it still holds ARGV[1].
const SWAP_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
  return 1
else
  return 0
end
"#;

/// Increment KEYS[1]; the first increment of a window sets its TTL.
const COUNTER_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Session store backed by a shared Redis instance.
pub struct RedisStore {
    conn: ConnectionManager,
    swap: Script,
    counter: Script,
}

impl RedisStore {
    /// Connect to Redis at the given URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Protocol(format!("invalid redis url: {}", e)))?;
        let conn = client.get_connection_manager().await.map_err(map_err)?;
        Ok(Self::from_manager(conn))
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            swap: Script::new(SWAP_SCRIPT),
            counter: Script::new(COUNTER_SCRIPT),
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn map_err(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_refusal() || e.is_connection_dropped()
    {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Protocol(e.to_string())
    }
}

/// Redis TTLs must be at least one second.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn put_refresh_token(
        &self,
        user_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(refresh_key(user_id), token, ttl_secs(ttl))
            .await
            .map_err(map_err)
    }

    async fn refresh_token(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        conn.get::<_, Option<String>>(refresh_key(user_id))
            .await
            .map_err(map_err)
    }

    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let swapped: i32 = self
            .swap
            .key(refresh_key(user_id))
            .arg(expected)
            .arg(token)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(swapped == 1)
    }

    async fn delete_refresh_token(&self, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        conn.del::<_, ()>(refresh_key(user_id)).await.map_err(map_err)
    }

    async fn put_session(
        &self,
        user_id: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let roles = serde_json::to_string(&record.roles)
            .map_err(|e| StoreError::Protocol(format!("roles encoding failed: {}", e)))?;
        let fields = [
            ("username", record.username.clone()),
            ("roles", roles),
            ("access_token", record.access_token.clone()),
            ("exp", record.expires_at.to_string()),
        ];

        let key = session_key(user_id);
        let mut conn = self.conn();
        conn.hset_multiple::<_, _, _, ()>(&key, &fields)
            .await
            .map_err(map_err)?;
        conn.expire::<_, ()>(&key, ttl_secs(ttl) as i64)
            .await
            .map_err(map_err)
    }

    async fn session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let mut conn = self.conn();
        let fields: HashMap<String, String> = conn
            .hgetall(session_key(user_id))
            .await
            .map_err(map_err)?;
        if fields.is_empty() {
            return Ok(None);
        }

        let get = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::Protocol(format!("session record missing {}", name)))
        };
        let roles: Vec<String> = serde_json::from_str(&get("roles")?)
            .map_err(|e| StoreError::Protocol(format!("roles decoding failed: {}", e)))?;
        let expires_at: u64 = get("exp")?
            .parse()
            .map_err(|e| StoreError::Protocol(format!("bad session expiry: {}", e)))?;

        Ok(Some(SessionRecord {
            username: get("username")?,
            roles,
            access_token: get("access_token")?,
            expires_at,
        }))
    }

    async fn delete_session(&self, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        conn.del::<_, ()>(session_key(user_id)).await.map_err(map_err)
    }

    async fn blacklist_token(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(blacklist_key(token), "1", ttl_secs(ttl))
            .await
            .map_err(map_err)
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        conn.exists::<_, bool>(blacklist_key(token))
            .await
            .map_err(map_err)
    }

    async fn incr_counter(
        &self,
        client: &str,
        endpoint: &str,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let count: u64 = self
            .counter
            .key(rate_limit_key(client, endpoint))
            .arg(ttl_secs(window))
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(count)
    }
}
