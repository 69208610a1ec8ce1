//! Cache Entry Module
//!
//! Defines the stored `(value, created_at, ttl)` triple shared by all adapters.

use serde::{Deserialize, Serialize};

use crate::cache::expiry;
use crate::cache::CacheValue;

// == Cache Entry ==
/// Represents a single cache entry with value and expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored value
    pub value: CacheValue,
    /// Creation timestamp (Unix seconds), fixed for the entry's lifetime
    pub created_at: i64,
    /// TTL in seconds, 0 = no expiration
    pub ttl: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped with `now`.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - TTL in seconds, 0 for none
    /// * `now` - Current Unix time in seconds
    pub fn new(value: CacheValue, ttl: u64, now: i64) -> Self {
        Self {
            value,
            created_at: now,
            ttl,
        }
    }

    // == Replace Value ==
    /// Returns a copy holding `value` with the original creation time and TTL.
    ///
    /// Counter mutations go through here so they never restart the expiry clock.
    pub fn with_value(&self, value: CacheValue) -> Self {
        Self {
            value,
            created_at: self.created_at,
            ttl: self.ttl,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry has expired at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        expiry::is_expired(self.created_at, self.ttl, now)
    }

    // == Expires At ==
    /// Unix timestamp of expiry, or 0 if the entry never expires.
    pub fn expires_at(&self) -> i64 {
        expiry::expires_at(self.created_at, self.ttl)
    }

    // == Time To Live ==
    /// Returns remaining TTL in seconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self, now: i64) -> Option<u64> {
        if self.ttl == 0 {
            return None;
        }
        let remaining = self.expires_at().saturating_sub(now);
        Some(remaining.max(0) as u64)
    }
}
