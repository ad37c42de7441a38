//! Last-known positions in a shared key-value cache.
//!
//! The cache itself is an external collaborator behind the
//! [`PositionCache`] trait: a plain string key-value store with
//! per-entry TTL. [`MemoryCache`] implements it in process.
//!
//! [`PositionCacheClient`] is what the rest of the server talks to. It
//! owns the key scheme (`position:<player_id>`), the JSON encoding of
//! records, and the timeout on every call. Its contract is
//! best-effort: a slow or broken cache is logged and reported as "no
//! value", never as an error the gameplay path has to handle.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use wayfarer_protocol::{PlayerId, PositionRecord};

use crate::MapError;

/// Key prefix for position records.
pub const POSITION_KEY_PREFIX: &str = "position:";

/// A string key-value cache with per-entry expiration.
///
/// Implementations are expected to use sliding expiration: a `get`
/// that finds a value resets its TTL.
pub trait PositionCache: Send + Sync + 'static {
    /// Returns the value under `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, MapError>> + Send;

    /// Stores `value` under `key`, expiring after `ttl` without access.
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), MapError>> + Send;
}

impl<T: PositionCache> PositionCache for Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, MapError>> + Send {
        (**self).get(key)
    }

    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), MapError>> + Send {
        (**self).set(key, value, ttl)
    }
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CacheEntry {
    value: String,
    ttl: Duration,
    expires_at: Instant,
}

/// In-process [`PositionCache`] with sliding expiration.
///
/// Uses tokio's clock, so tests can drive expiry with a paused runtime.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl PositionCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, MapError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + entry.ttl;
                Ok(Some(entry.value.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), MapError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                ttl,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PositionCacheClient
// ---------------------------------------------------------------------------

/// Typed, time-bounded access to positions in a [`PositionCache`].
#[derive(Debug)]
pub struct PositionCacheClient<C> {
    cache: C,
    ttl: Duration,
    timeout: Duration,
}

impl<C: PositionCache> PositionCacheClient<C> {
    pub fn new(cache: C, ttl: Duration, timeout: Duration) -> Self {
        Self {
            cache,
            ttl,
            timeout,
        }
    }

    pub fn key(player_id: &PlayerId) -> String {
        format!("{POSITION_KEY_PREFIX}{player_id}")
    }

    /// Writes a record. Returns whether the write landed; failures are
    /// logged here and never propagated.
    pub async fn store(&self, record: &PositionRecord) -> bool {
        match self.try_store(record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    player_id = %record.player_id,
                    error = %e,
                    "position cache write failed"
                );
                false
            }
        }
    }

    pub async fn try_store(&self, record: &PositionRecord) -> Result<(), MapError> {
        let key = Self::key(&record.player_id);
        let value = serde_json::to_string(record).map_err(MapError::Encode)?;
        tokio::time::timeout(self.timeout, self.cache.set(&key, value, self.ttl))
            .await
            .map_err(|_| MapError::Timeout {
                op: "cache set",
                after: self.timeout,
            })?
    }

    /// Reads a record. A miss, a timeout, and a cache error all come
    /// back as `None`; the last two are logged.
    pub async fn load(&self, player_id: &PlayerId) -> Option<PositionRecord> {
        match self.try_load(player_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(%player_id, error = %e, "position cache read failed");
                None
            }
        }
    }

    /// Reads a record, distinguishing a miss (`Ok(None)`) from a cache
    /// that could not answer (`Err`).
    pub async fn try_load(&self, player_id: &PlayerId) -> Result<Option<PositionRecord>, MapError> {
        let key = Self::key(player_id);
        let raw = tokio::time::timeout(self.timeout, self.cache.get(&key))
            .await
            .map_err(|_| MapError::Timeout {
                op: "cache get",
                after: self.timeout,
            })??;

        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|source| MapError::Decode { key, source }),
            None => Ok(None),
        }
    }
}
