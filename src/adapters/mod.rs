//! Adapters Module
//!
//! Concrete storage backends implementing the [`Cache`](crate::cache::Cache)
//! interface.
//!
//! # Adapters
//! - `memory`: in-process map
//! - `file`: hash-sharded files on local disk
//! - `redis`: side-indexed redis store (requires the `redis` feature)
//! - `memcache`: side-indexed memcached store (requires the `memcache` feature)

mod file;
pub mod indexed;
#[cfg(feature = "memcache")]
mod memcache;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use file::FileCache;
pub use indexed::{IndexedCache, RemoteStore};
#[cfg(feature = "memcache")]
pub use self::memcache::{MemcacheCache, MemcacheStore};
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::{RedisCache, RedisStore};
