//! Mini Cache - pluggable key-value cache with per-entry expiry
//!
//! One async facade over in-memory, file-system and networked (Redis, Memcache)
//! backends, each with lazy expiry on read and a periodic GC sweeper.

pub mod adapters;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod registry;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, CacheValue};
pub use config::{CacheConfig, CacheOptions, Config};
pub use error::{CacheError, Result};
pub use registry::CacheFactory;
