//! Adapter Factory
//!
//! Maps adapter names to constructors. Built once at start-up; the set of
//! adapters is fixed afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::adapters::{FileCache, MemoryCache};
use crate::cache::Cache;
use crate::config::{CacheConfig, CacheOptions};
use crate::error::{CacheError, Result};

// == Adapter Constructor ==
/// Starts an adapter from its configuration.
#[async_trait]
pub trait AdapterConstructor: Send + Sync {
    async fn start(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>>;
}

fn mismatch(expected: &str, config: &CacheConfig) -> CacheError {
    CacheError::Config(format!(
        "{} adapter cannot start from {} configuration",
        expected,
        config.adapter_name()
    ))
}

/// Constructor for [`MemoryCache`].
pub struct MemoryConstructor;

#[async_trait]
impl AdapterConstructor for MemoryConstructor {
    async fn start(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>> {
        match config {
            CacheConfig::Memory(config) => Ok(MemoryCache::start_and_gc(config.clone()).await?),
            other => Err(mismatch("memory", other)),
        }
    }
}

/// Constructor for [`FileCache`].
pub struct FileConstructor;

#[async_trait]
impl AdapterConstructor for FileConstructor {
    async fn start(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>> {
        match config {
            CacheConfig::File(config) => Ok(FileCache::start_and_gc(config.clone()).await?),
            other => Err(mismatch("file", other)),
        }
    }
}

/// Constructor for [`RedisCache`](crate::adapters::RedisCache).
#[cfg(feature = "redis")]
pub struct RedisConstructor;

#[cfg(feature = "redis")]
#[async_trait]
impl AdapterConstructor for RedisConstructor {
    async fn start(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>> {
        match config {
            CacheConfig::Redis(config) => {
                Ok(crate::adapters::RedisCache::start_and_gc(config.clone()).await?)
            }
            other => Err(mismatch("redis", other)),
        }
    }
}

/// Constructor for [`MemcacheCache`](crate::adapters::MemcacheCache).
#[cfg(feature = "memcache")]
pub struct MemcacheConstructor;

#[cfg(feature = "memcache")]
#[async_trait]
impl AdapterConstructor for MemcacheConstructor {
    async fn start(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>> {
        match config {
            CacheConfig::Memcache(config) => {
                Ok(crate::adapters::MemcacheCache::start_and_gc(config.clone()).await?)
            }
            other => Err(mismatch("memcache", other)),
        }
    }
}

// == Factory ==
/// Creates started cache instances by adapter name.
pub struct CacheFactory {
    constructors: HashMap<String, Box<dyn AdapterConstructor>>,
}

impl CacheFactory {
    pub fn builder() -> CacheFactoryBuilder {
        CacheFactoryBuilder {
            constructors: HashMap::new(),
        }
    }

    /// Factory with every adapter compiled into this build.
    pub fn with_defaults() -> Result<Self> {
        let builder = Self::builder()
            .register("memory", MemoryConstructor)?
            .register("file", FileConstructor)?;
        #[cfg(feature = "redis")]
        let builder = builder.register("redis", RedisConstructor)?;
        #[cfg(feature = "memcache")]
        let builder = builder.register("memcache", MemcacheConstructor)?;
        Ok(builder.build())
    }

    /// Registered adapter names, sorted.
    pub fn adapters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Starts the adapter `config` selects.
    pub async fn create(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>> {
        let name = config.adapter_name();
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| CacheError::UnknownAdapter(name.to_string()))?;

        let cache = constructor.start(config).await?;
        info!("Created {} cache", name);
        Ok(cache)
    }

    /// Validates loose options, then starts the selected adapter.
    pub async fn create_from_options(&self, options: CacheOptions) -> Result<Arc<dyn Cache>> {
        self.create(&options.into_config()?).await
    }
}

/// Collects constructors for a [`CacheFactory`].
pub struct CacheFactoryBuilder {
    constructors: HashMap<String, Box<dyn AdapterConstructor>>,
}

impl CacheFactoryBuilder {
    /// Adds a constructor. Registering a name twice is an error.
    pub fn register(
        mut self,
        name: impl Into<String>,
        constructor: impl AdapterConstructor + 'static,
    ) -> Result<Self> {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(CacheError::Config(format!(
                "adapter {:?} registered twice",
                name
            )));
        }
        self.constructors.insert(name, Box::new(constructor));
        Ok(self)
    }

    pub fn build(self) -> CacheFactory {
        CacheFactory {
            constructors: self.constructors,
        }
    }
}
