//! Key-value store with TTL
//!
//! Manifests live in a store whose own expiry is authoritative: once a
//! key's TTL has passed, `get` and `list_all` no longer see it.

use crate::domain::clock::{Clock, SystemClock};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Persistent key-value storage with per-key expiry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key` for `ttl_seconds`, replacing any previous value
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    /// Fetch a live value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Every live key/value pair
    async fn list_all(&self) -> Result<Vec<(String, String)>>;
}

/// Convert a TTL in seconds to an absolute expiry
pub fn expiry_from(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    let seconds = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
    Duration::try_seconds(seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// In-memory store, for tests and ephemeral runs
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, (String, DateTime<Utc>)>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let expires_at = expiry_from(self.clock.now(), ttl_seconds);
        self.entries()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries();

        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= now => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries().remove(key).is_some())
    }

    async fn list_all(&self) -> Result<Vec<(String, String)>> {
        let now = self.clock.now();
        let mut entries = self.entries();
        entries.retain(|_, (_, expires_at)| *expires_at > now);

        let mut live: Vec<_> = entries
            .iter()
            .map(|(k, (v, _))| (k.clone(), v.clone()))
            .collect();
        live.sort();
        Ok(live)
    }
}
