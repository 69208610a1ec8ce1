//! Cache Module
//!
//! The uniform cache interface plus the adapter-independent pieces every
//! backend shares: entries, values, codec, key hashing and expiry.

pub mod codec;
mod entry;
pub mod expiry;
pub mod hasher;
mod value;


use async_trait::async_trait;

use crate::error::{CacheError, Result};

// Re-export public types
pub use entry::CacheEntry;
pub use expiry::{system_clock, Clock, ManualClock, SystemClock};
pub use hasher::KeyHasher;
pub use value::CacheValue;

// == Cache Facade ==
/// Behaviour shared by every cache adapter.
///
/// ```ignore
/// cache.put("counter", CacheValue::Int(1), 3600).await?;
/// cache.incr("counter").await?;
/// assert_eq!(cache.get("counter").await, Some(CacheValue::Int(2)));
/// ```
#[async_trait]
pub trait Cache: Send + Sync {
    /// Registered name of the backend.
    fn adapter_name(&self) -> &'static str;

    /// Returns the live value for `key`. Missing, expired and unreadable
    /// entries are all reported as `None`.
    async fn get(&self, key: &str) -> Option<CacheValue>;

    /// Stores `value` under `key`, replacing any previous entry.
    /// A `ttl` of 0 never expires.
    async fn put(&self, key: &str, value: CacheValue, ttl: u64) -> Result<()>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Increments an integer counter without touching its expiry.
    async fn incr(&self, key: &str) -> Result<()>;

    /// Decrements an integer counter without touching its expiry.
    async fn decr(&self, key: &str) -> Result<()>;

    /// True if `key` holds a live entry. Expired entries are removed.
    async fn is_exist(&self, key: &str) -> bool;

    /// Drops every entry and resets storage to its initial empty state.
    async fn clear_all(&self) -> Result<()>;
}

/// Rejects keys no adapter can store.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    Ok(())
}
