//! Memory Adapter
//!
//! In-process HashMap storage with lazy expiry and a background GC sweep.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::{system_clock, validate_key, Cache, CacheEntry, CacheValue, Clock};
use crate::config::MemoryConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_gc_task, GcState, Sweep, SweepReport};

// == Memory Cache ==
/// Cache adapter keeping every entry in process memory.
#[derive(Debug)]
pub struct MemoryCache {
    /// Key-value storage
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Time source for expiry
    clock: Arc<dyn Clock>,
    gc_state: GcState,
}

impl MemoryCache {
    // == Constructor ==
    /// Starts a memory adapter on the wall clock, spawning its sweeper when
    /// `interval_seconds >= 1`.
    pub async fn start_and_gc(config: MemoryConfig) -> Result<Arc<Self>> {
        Self::start_with_clock(config, system_clock()).await
    }

    /// Like [`MemoryCache::start_and_gc`] with an injected clock.
    pub async fn start_with_clock(config: MemoryConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        let cache = Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            gc_state: GcState::for_interval(config.interval_seconds),
        });

        spawn_gc_task(&cache, config.interval_seconds);
        info!(
            "Memory cache started (gc interval {}s)",
            config.interval_seconds
        );
        Ok(cache)
    }

    pub fn gc_state(&self) -> GcState {
        self.gc_state
    }

    // == Length ==
    /// Returns the number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    // == Is Empty ==
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remaining TTL for `key` in seconds; `None` if absent or unbounded.
    pub async fn ttl_remaining(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.ttl_remaining(now))
    }

    /// Looks up a live entry, evicting it if it has expired.
    async fn live_entry(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a concurrent put may have replaced it.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            debug!(key, "Evicted expired entry on read");
        }
        None
    }

    // == Counter Update ==
    async fn add(&self, key: &str, delta: i64) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return Err(CacheError::NotFound(key.to_string())),
        };
        if expired {
            entries.remove(key);
            return Err(CacheError::NotFound(key.to_string()));
        }

        if let Some(entry) = entries.get_mut(key) {
            *entry = entry.with_value(entry.value.add(delta)?);
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn adapter_name(&self) -> &'static str {
        "memory"
    }

    // == Get ==
    async fn get(&self, key: &str) -> Option<CacheValue> {
        self.live_entry(key).await.map(|entry| entry.value)
    }

    // == Put ==
    async fn put(&self, key: &str, value: CacheValue, ttl: u64) -> Result<()> {
        validate_key(key)?;
        let entry = CacheEntry::new(value, ttl, self.clock.now());
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<()> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<()> {
        self.add(key, -1).await
    }

    // == Is Exist ==
    async fn is_exist(&self, key: &str) -> bool {
        self.live_entry(key).await.is_some()
    }

    // == Clear All ==
    async fn clear_all(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[async_trait]
impl Sweep for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    // == Cleanup Expired ==
    /// Removes all expired entries in one pass under the write lock.
    async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        let scanned = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));

        SweepReport {
            scanned,
            removed: scanned - entries.len(),
            skipped: 0,
        }
    }
}
