//! In-memory session store for tests and single-node development.
//!
//! Expiry is enforced lazily: entries past their deadline are treated
//! as absent on read and overwritten on write. A blacklisted token
//! whose TTL has elapsed therefore reads as not-blacklisted, matching
//! the Redis backend's natural expiry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{
    SessionRecord, SessionStore, StoreError, blacklist_key, rate_limit_key, refresh_key,
    session_key,
};

enum Value {
    Text(String),
    Session(SessionRecord),
    Counter(u64),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Session store backed by a process-local map.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, key: String, value: Value, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().expect("store lock").insert(key, entry);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().expect("store lock").remove(key);
    }

    fn read_text(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().expect("store lock");
        let entry = entries.get(key)?;
        if !entry.live(Instant::now()) {
            return None;
        }
        match &entry.value {
            Value::Text(text) => Some(text.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put_refresh_token(
        &self,
        user_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.put(refresh_key(user_id), Value::Text(token.to_string()), Some(ttl));
        Ok(())
    }

    async fn refresh_token(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_text(&refresh_key(user_id)))
    }

    async fn swap_refresh_token(
        &self,
        user_id: &str,
        expected: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().expect("store lock");
        let key = refresh_key(user_id);
        let now = Instant::now();

        let matches = match entries.get(&key) {
            Some(entry) if entry.live(now) => match &entry.value {
                Value::Text(stored) => stored == expected,
                _ => false,
            },
            _ => false,
        };
        if !matches {
            return Ok(false);
        }

        entries.insert(
            key,
            Entry {
                value: Value::Text(token.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete_refresh_token(&self, user_id: &str) -> Result<(), StoreError> {
        self.remove(&refresh_key(user_id));
        Ok(())
    }

    async fn put_session(
        &self,
        user_id: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.put(session_key(user_id), Value::Session(record.clone()), Some(ttl));
        Ok(())
    }

    async fn session(&self, user_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let entries = self.entries.lock().expect("store lock");
        let entry = match entries.get(&session_key(user_id)) {
            Some(entry) if entry.live(Instant::now()) => entry,
            _ => return Ok(None),
        };
        match &entry.value {
            Value::Session(record) => Ok(Some(record.clone())),
            _ => Ok(None),
        }
    }

    async fn delete_session(&self, user_id: &str) -> Result<(), StoreError> {
        self.remove(&session_key(user_id));
        Ok(())
    }

    async fn blacklist_token(&self, token: &str, ttl: Duration) -> Result<(), StoreError> {
        self.put(blacklist_key(token), Value::Text("1".to_string()), Some(ttl));
        Ok(())
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.read_text(&blacklist_key(token)).is_some())
    }

    async fn incr_counter(
        &self,
        client: &str,
        endpoint: &str,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().expect("store lock");
        let key = rate_limit_key(client, endpoint);
        let now = Instant::now();

        if let Some(entry) = entries.get_mut(&key) {
            if entry.live(now) {
                if let Value::Counter(count) = &mut entry.value {
                    *count += 1;
                    return Ok(*count);
                }
            }
        }

        // Absent or expired: start a fresh window.
        entries.insert(
            key,
            Entry {
                value: Value::Counter(1),
                expires_at: Some(now + window),
            },
        );
        Ok(1)
    }
}
