//! Memcache Adapter
//!
//! [`RemoteStore`] over a memcached client. Memcached expires keys and
//! updates counters itself but cannot enumerate keys, so the side index is
//! a JSON map stored under one extra key. The client is blocking; every call
//! runs on tokio's blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use memcache::{CommandError, MemcacheError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::adapters::indexed::{IndexedCache, RemoteStore};
use crate::cache::{codec, expiry, hasher, system_clock, Clock};
use crate::config::MemcacheConfig;
use crate::error::{CacheError, Result};

/// Longest key memcached accepts.
const MAX_KEY_LEN: usize = 250;

/// Memcached reads relative expirations above 30 days as Unix timestamps.
const MAX_RELATIVE_TTL: u64 = 60 * 60 * 24 * 30;

/// Memcached-backed side-indexed cache.
pub type MemcacheCache = IndexedCache<MemcacheStore>;

// == Memcache Store ==
pub struct MemcacheStore {
    client: Arc<memcache::Client>,
    clock: Arc<dyn Clock>,
    /// Index updates are read-modify-write of one value; serialized per process
    index_lock: Mutex<()>,
}

impl MemcacheStore {
    /// Opens a connection and verifies it with a `version` round trip.
    pub async fn connect(config: &MemcacheConfig) -> Result<Self> {
        let url = connection_url(&config.addr);
        let client = tokio::task::spawn_blocking(move || -> Result<memcache::Client> {
            let client = memcache::Client::connect(url)?;
            client.version()?;
            Ok(client)
        })
        .await
        .map_err(join_error)??;
        debug!(addr = %config.addr, "Connected to memcached");

        Ok(Self {
            client: Arc::new(client),
            clock: system_clock(),
            index_lock: Mutex::new(()),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client) -> Result<T> + Send + 'static,
    {
        let client = self.client.clone();
        tokio::task::spawn_blocking(move || op(&client))
            .await
            .map_err(join_error)?
    }

    async fn load_index(&self, index: &str) -> Result<HashMap<String, i64>> {
        let k = wire_key(index);
        let raw = self.run(move |c| Ok(c.get::<Vec<u8>>(&k)?)).await?;
        match raw {
            None => Ok(HashMap::new()),
            Some(raw) => Ok(codec::decode(&raw).unwrap_or_else(|e| {
                warn!(index, error = %e, "Discarding unreadable memcache side index");
                HashMap::new()
            })),
        }
    }

    async fn update_index<F>(&self, index: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut HashMap<String, i64>) + Send,
    {
        let _guard = self.index_lock.lock().await;
        let mut records = self.load_index(index).await?;
        update(&mut records);

        let data = codec::encode(&records)?;
        let k = wire_key(index);
        self.run(move |c| Ok(c.set(&k, data.as_slice(), 0)?)).await
    }
}

fn join_error(err: tokio::task::JoinError) -> CacheError {
    CacheError::Medium(format!("memcache call did not complete: {}", err))
}

fn connection_url(addr: &str) -> String {
    if addr.starts_with("memcache://") || addr.starts_with("memcache+") {
        addr.to_string()
    } else {
        format!("memcache://{}", addr)
    }
}

/// Keys memcached cannot hold (too long, spaces, control bytes) are sent
/// as their digest.
fn wire_key(key: &str) -> String {
    if key.len() <= MAX_KEY_LEN && key.bytes().all(|b| b.is_ascii_graphic()) {
        key.to_string()
    } else {
        format!("sha256:{}", hasher::digest(key))
    }
}

/// Memcached expiration field for `ttl` seconds from `now`.
fn expiration(now: i64, ttl: u64) -> u32 {
    if ttl <= MAX_RELATIVE_TTL {
        return ttl as u32;
    }
    u32::try_from(expiry::expires_at(now, ttl)).unwrap_or(u32::MAX)
}

fn is_not_found(err: &MemcacheError) -> bool {
    matches!(err, MemcacheError::CommandError(CommandError::KeyNotFound))
}

impl IndexedCache<MemcacheStore> {
    /// Connects to memcached and starts the index sweeper.
    pub async fn start_and_gc(config: MemcacheConfig) -> Result<Arc<Self>> {
        let store = MemcacheStore::connect(&config).await?;
        Ok(IndexedCache::start(
            store,
            config.index_key,
            config.interval_seconds,
            system_clock(),
        ))
    }
}

#[async_trait]
impl RemoteStore for MemcacheStore {
    fn name(&self) -> &'static str {
        "memcache"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let k = wire_key(key);
        self.run(move |c| Ok(c.get::<Vec<u8>>(&k)?)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<()> {
        let k = wire_key(key);
        let exp = expiration(self.clock.now(), ttl);
        self.run(move |c| Ok(c.set(&k, value.as_slice(), exp)?)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let k = wire_key(key);
        self.run(move |c| {
            c.delete(&k)?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Memcached counters are unsigned 64-bit, so the native primitive is
    /// used only while both the stored and the resulting value are
    /// non-negative. Anything else is refused as a type error and the
    /// caller falls back to a decoded update.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        let k = wire_key(key);
        self.run(move |c| {
            let Some(raw) = c.get::<Vec<u8>>(&k)? else {
                return Ok(None);
            };
            let current = std::str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok());
            match current.and_then(|n| n.checked_add(delta).map(|next| (n, next))) {
                Some((n, next)) if n >= 0 && next >= 0 => {}
                _ => {
                    return Err(CacheError::Type(format!(
                        "{} does not hold a memcached counter",
                        k
                    )))
                }
            }

            let result = if delta >= 0 {
                c.increment(&k, delta.unsigned_abs())
            } else {
                c.decrement(&k, delta.unsigned_abs())
            };
            match result {
                Ok(n) => i64::try_from(n)
                    .map(Some)
                    .map_err(|_| CacheError::Type(format!("counter overflow at {}", n))),
                Err(e) if is_not_found(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Memcached has no keep-TTL write, so `ttl` is re-applied.
    async fn replace(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<bool> {
        let k = wire_key(key);
        let exp = expiration(self.clock.now(), ttl);
        self.run(move |c| {
            match c.replace(&k, value.as_slice(), exp) {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => return Ok(false),
                Err(e) => return Err(e.into()),
            }
            // A refused replace is not an error on every protocol version.
            Ok(c.get::<Vec<u8>>(&k)?.is_some_and(|stored| stored == value))
        })
        .await
    }

    async fn index_get(&self, index: &str, key: &str) -> Result<Option<i64>> {
        Ok(self.load_index(index).await?.get(key).copied())
    }

    async fn index_set(&self, index: &str, key: &str, expires_at: i64) -> Result<()> {
        let key = key.to_string();
        self.update_index(index, move |records| {
            records.insert(key, expires_at);
        })
        .await
    }

    async fn index_remove(&self, index: &str, key: &str) -> Result<()> {
        let key = key.to_string();
        self.update_index(index, move |records| {
            records.remove(&key);
        })
        .await
    }

    async fn index_entries(&self, index: &str) -> Result<Vec<(String, i64)>> {
        Ok(self.load_index(index).await?.into_iter().collect())
    }

    async fn index_clear(&self, index: &str) -> Result<()> {
        let _guard = self.index_lock.lock().await;
        let k = wire_key(index);
        self.run(move |c| {
            c.delete(&k)?;
            Ok(())
        })
        .await
    }
}
