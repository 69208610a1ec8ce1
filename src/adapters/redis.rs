//! Redis Adapter
//!
//! [`RemoteStore`] over a multiplexed redis connection. Values use `SETEX`
//! so redis enforces expiry itself; the side index is a redis hash.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::debug;

use crate::adapters::indexed::{IndexedCache, RemoteStore};
use crate::cache::system_clock;
use crate::config::RedisConfig;
use crate::error::{CacheError, Result};

/// Increments only keys that already exist, so an absent counter is not
/// silently created without a TTL.
const INCR_EXISTING: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
"#;

/// Redis-backed side-indexed cache.
pub type RedisCache = IndexedCache<RedisStore>;

// == Redis Store ==
pub struct RedisStore {
    conn: MultiplexedConnection,
    incr_script: Script,
}

impl RedisStore {
    /// Opens a connection and verifies it with a `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(connection_url(config))?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(addr = %config.addr, db = config.db, "Connected to redis");

        Ok(Self {
            conn,
            incr_script: Script::new(INCR_EXISTING),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

fn connection_url(config: &RedisConfig) -> String {
    let password = config.password.as_deref().unwrap_or("");
    if config.network == "unix" {
        let mut url = format!("redis+unix://{}?db={}", config.addr, config.db);
        if !password.is_empty() {
            url.push_str(&format!("&pass={}", password));
        }
        url
    } else if password.is_empty() {
        format!("redis://{}/{}", config.addr, config.db)
    } else {
        format!("redis://:{}@{}/{}", password, config.addr, config.db)
    }
}

/// Server replies that mean the stored value cannot take the increment.
const COUNTER_REFUSALS: [&str; 2] = ["not an integer", "would overflow"];

fn counter_error(key: &str, err: redis::RedisError) -> CacheError {
    let message = err.to_string();
    if COUNTER_REFUSALS.iter().any(|m| message.contains(m)) {
        CacheError::Type(format!("{} cannot be incremented: {}", key, message))
    } else {
        err.into()
    }
}

impl IndexedCache<RedisStore> {
    /// Connects to redis and starts the index sweeper.
    pub async fn start_and_gc(config: RedisConfig) -> Result<Arc<Self>> {
        let store = RedisStore::connect(&config).await?;
        Ok(IndexedCache::start(
            store,
            config.index_key,
            config.interval_seconds,
            system_clock(),
        ))
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<()> {
        let mut conn = self.conn();
        if ttl > 0 {
            conn.set_ex::<_, _, ()>(key, value, ttl).await?;
        } else {
            conn.set::<_, _, ()>(key, value).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.conn().del::<_, ()>(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.conn().exists(key).await?)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        let mut conn = self.conn();
        let result: redis::RedisResult<Option<i64>> = self
            .incr_script
            .key(key)
            .arg(delta)
            .invoke_async(&mut conn)
            .await;

        result.map_err(|e| counter_error(key, e))
    }

    async fn replace(&self, key: &str, value: Vec<u8>, _ttl: u64) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("XX")
            .arg("KEEPTTL")
            .query_async(&mut self.conn())
            .await?;
        Ok(reply.is_some())
    }

    async fn index_get(&self, index: &str, key: &str) -> Result<Option<i64>> {
        Ok(self.conn().hget(index, key).await?)
    }

    async fn index_set(&self, index: &str, key: &str, expires_at: i64) -> Result<()> {
        self.conn().hset::<_, _, _, ()>(index, key, expires_at).await?;
        Ok(())
    }

    async fn index_remove(&self, index: &str, key: &str) -> Result<()> {
        self.conn().hdel::<_, _, ()>(index, key).await?;
        Ok(())
    }

    async fn index_entries(&self, index: &str) -> Result<Vec<(String, i64)>> {
        let records: HashMap<String, i64> = self.conn().hgetall(index).await?;
        Ok(records.into_iter().collect())
    }

    async fn index_clear(&self, index: &str) -> Result<()> {
        self.conn().del::<_, ()>(index).await?;
        Ok(())
    }
}
