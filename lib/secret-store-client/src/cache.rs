use crate::clock::Clock;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Cached value with its lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Builds the cache key for a path and an optional pinned version.
pub fn cache_key(path: &str, version: Option<u64>) -> String {
    match version {
        Some(v) => format!("{}:{}", path, v),
        None => format!("{}:latest", path),
    }
}

/// In-memory TTL map, owned by a single client.
///
/// Every invalidation bumps a generation counter. Readers that fetch outside
/// the cache capture [`SecretCache::generation`] first and store through
/// [`SecretCache::set_if_current`], so a fetch that raced a write cannot put
/// pre-write data back.
pub struct SecretCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    generation: AtomicU64,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> SecretCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    /// Returns the value if it has not expired; expired entries are evicted.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if now <= entry.expires_at => return Some(entry.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        // Re-check under the write lock; a concurrent set may have refreshed it.
        if let Some(entry) = entries.get(key) {
            if now <= entry.expires_at {
                return Some(entry.data.clone());
            }
            entries.remove(key);
        }
        None
    }

    pub async fn set(&self, key: impl Into<String>, data: T) {
        let entry = self.entry(data);
        self.entries.write().await.insert(key.into(), entry);
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Stores `data` unless the cache was invalidated since `generation` was read.
    /// Returns whether the value was stored.
    pub async fn set_if_current(&self, key: impl Into<String>, data: T, generation: u64) -> bool {
        let entry = self.entry(data);
        let mut entries = self.entries.write().await;
        if self.generation() != generation {
            return false;
        }
        entries.insert(key.into(), entry);
        true
    }

    fn entry(&self, data: T) -> CacheEntry<T> {
        let created_at = self.clock.now();
        let expires_at = created_at.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        CacheEntry {
            data,
            created_at,
            expires_at,
        }
    }

    /// Removes every entry whose key starts with `prefix`. Returns how many were removed.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
