//! Expiration Policy
//!
//! The single expiry rule shared by lazy reads and GC sweeps, and the clock
//! it is evaluated against.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

// == Policy ==
/// Returns true when an entry created at `created_at` with `ttl_seconds`
/// has expired at `now`. A TTL of zero never expires.
///
/// Boundary condition: the entry is expired once exactly `ttl_seconds`
/// have elapsed.
pub fn is_expired(created_at: i64, ttl_seconds: u64, now: i64) -> bool {
    ttl_seconds > 0 && now.saturating_sub(created_at) >= ttl_as_i64(ttl_seconds)
}

/// Unix timestamp at which the entry expires, or `0` if it never does.
pub fn expires_at(created_at: i64, ttl_seconds: u64) -> i64 {
    if ttl_seconds == 0 {
        0
    } else {
        created_at.saturating_add(ttl_as_i64(ttl_seconds))
    }
}

fn ttl_as_i64(ttl_seconds: u64) -> i64 {
    i64::try_from(ttl_seconds).unwrap_or(i64::MAX)
}

// == Clock ==
/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Shared handle to the wall clock.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// A clock that only moves when told to. Used to simulate the passage of
/// time against an adapter.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Starts at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now())
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
