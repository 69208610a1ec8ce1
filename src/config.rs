//! Configuration Module
//!
//! Typed adapter configuration, the loose options form it is validated
//! from, and the server settings loaded from environment variables.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// GC interval used when none is given.
pub const DEFAULT_GC_INTERVAL: u64 = 60;

/// Redis hash that holds the side index when none is given.
pub const DEFAULT_INDEX_KEY: &str = "MiniCache";

fn default_interval() -> u64 {
    DEFAULT_GC_INTERVAL
}

// == Adapter Configuration ==
/// Validated configuration for exactly one adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "lowercase")]
pub enum CacheConfig {
    Memory(MemoryConfig),
    File(FileConfig),
    Redis(RedisConfig),
    Memcache(MemcacheConfig),
}

impl CacheConfig {
    /// Name the factory looks the adapter up by.
    pub fn adapter_name(&self) -> &'static str {
        match self {
            CacheConfig::Memory(_) => "memory",
            CacheConfig::File(_) => "file",
            CacheConfig::Redis(_) => "redis",
            CacheConfig::Memcache(_) => "memcache",
        }
    }
}

/// In-process adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    /// GC period in seconds, 0 disables the sweeper
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_GC_INTERVAL,
        }
    }
}

/// Filesystem adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Directory holding the sharded entry files
    pub root_path: PathBuf,
    /// GC period in seconds, 0 disables the sweeper
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl FileConfig {
    pub fn new(root_path: impl Into<PathBuf>, interval_seconds: u64) -> Self {
        Self {
            root_path: root_path.into(),
            interval_seconds,
        }
    }
}

/// Redis adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    /// `tcp` or `unix`
    #[serde(default = "default_network")]
    pub network: String,
    /// `host:port`, or a socket path for `unix`
    pub addr: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    /// Hash holding the side index
    #[serde(default = "default_index_key")]
    pub index_key: String,
    /// Side-index sweep period in seconds, 0 disables it
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

fn default_network() -> String {
    "tcp".to_string()
}

fn default_index_key() -> String {
    DEFAULT_INDEX_KEY.to_string()
}

impl RedisConfig {
    /// Parses a connection string such as
    /// `addr=127.0.0.1:6379,password=secret,db=0,key=MyIndex`.
    ///
    /// A string without any `=` is taken as a bare address. Unknown options
    /// are rejected by name.
    pub fn from_conn_str(conn: &str) -> Result<Self> {
        let conn = conn.trim();
        if conn.is_empty() {
            return Err(CacheError::Config(
                "redis: connection string is empty".to_string(),
            ));
        }

        let mut config = RedisConfig {
            network: default_network(),
            addr: String::new(),
            password: None,
            db: 0,
            index_key: default_index_key(),
            interval_seconds: DEFAULT_GC_INTERVAL,
        };

        if !conn.contains('=') {
            config.addr = conn.to_string();
            return Ok(config);
        }

        for part in conn.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                CacheError::Config(format!("redis: malformed option {:?}", part))
            })?;
            let value = value.trim();

            match name.trim() {
                "network" => config.network = value.to_string(),
                "addr" => config.addr = value.to_string(),
                "password" => config.password = Some(value.to_string()),
                "db" => config.db = parse_number("redis", "db", value)?,
                "key" => config.index_key = value.to_string(),
                "interval" => config.interval_seconds = parse_number("redis", "interval", value)?,
                other => {
                    return Err(CacheError::Config(format!(
                        "redis: unsupported option {:?}",
                        other
                    )))
                }
            }
        }

        if config.addr.is_empty() {
            return Err(CacheError::Config("redis: no addr given".to_string()));
        }
        if config.network != "tcp" && config.network != "unix" {
            return Err(CacheError::Config(format!(
                "redis: unsupported network {:?}",
                config.network
            )));
        }
        Ok(config)
    }
}

/// Memcached adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemcacheConfig {
    /// `host:port` or a `memcache://` URL
    pub addr: String,
    /// Key holding the side index
    #[serde(default = "default_index_key")]
    pub index_key: String,
    /// Side-index sweep period in seconds, 0 disables it
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

impl MemcacheConfig {
    /// Parses a connection string such as `addr=127.0.0.1:11211,key=MyIndex`.
    /// A string without any `=` is taken as a bare address.
    pub fn from_conn_str(conn: &str) -> Result<Self> {
        let conn = conn.trim();
        if conn.is_empty() {
            return Err(CacheError::Config(
                "memcache: connection string is empty".to_string(),
            ));
        }

        let mut config = MemcacheConfig {
            addr: String::new(),
            index_key: default_index_key(),
            interval_seconds: DEFAULT_GC_INTERVAL,
        };

        if !conn.contains('=') {
            config.addr = conn.to_string();
            return Ok(config);
        }

        for part in conn.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                CacheError::Config(format!("memcache: malformed option {:?}", part))
            })?;
            let value = value.trim();

            match name.trim() {
                "addr" => config.addr = value.to_string(),
                "key" => config.index_key = value.to_string(),
                "interval" => {
                    config.interval_seconds = parse_number("memcache", "interval", value)?
                }
                other => {
                    return Err(CacheError::Config(format!(
                        "memcache: unsupported option {:?}",
                        other
                    )))
                }
            }
        }

        if config.addr.is_empty() {
            return Err(CacheError::Config("memcache: no addr given".to_string()));
        }
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(adapter: &str, name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CacheError::Config(format!(
            "{}: {} must be a number, got {:?}",
            adapter, name, value
        ))
    })
}

// == Cache Options ==
/// Loose, caller-facing options, validated into a [`CacheConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    /// Adapter name, `memory` when empty
    #[serde(default)]
    pub adapter: String,
    /// GC period for the memory and file adapters, 60 when unset
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    /// Backend location: root path for `file`, connection string for `redis`
    #[serde(default)]
    pub connection_string: String,
}

impl CacheOptions {
    /// Applies defaults and validates the options for the chosen adapter.
    pub fn into_config(self) -> Result<CacheConfig> {
        let adapter = if self.adapter.is_empty() {
            "memory".to_string()
        } else {
            self.adapter
        };
        let interval_seconds = self.interval_seconds.unwrap_or(DEFAULT_GC_INTERVAL);

        if adapter != "memory" && self.connection_string.trim().is_empty() {
            return Err(CacheError::Config(format!(
                "no connection string is given for {} cache adapter",
                adapter
            )));
        }

        match adapter.as_str() {
            "memory" => Ok(CacheConfig::Memory(MemoryConfig { interval_seconds })),
            "file" => Ok(CacheConfig::File(FileConfig::new(
                self.connection_string.trim(),
                interval_seconds,
            ))),
            "redis" => Ok(CacheConfig::Redis(RedisConfig::from_conn_str(
                &self.connection_string,
            )?)),
            "memcache" => Ok(CacheConfig::Memcache(MemcacheConfig::from_conn_str(
                &self.connection_string,
            )?)),
            _ => Err(CacheError::UnknownAdapter(adapter)),
        }
    }
}

// == Server Configuration ==
/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Cache adapter options
    pub cache: CacheOptions,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_ADAPTER` - Adapter name (default: memory)
    /// - `CACHE_INTERVAL` - GC interval in seconds (default: 60)
    /// - `CACHE_CONN` - Root path or connection string (default: empty)
    pub fn from_env() -> Self {
        Self {
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            cache: CacheOptions {
                adapter: env::var("CACHE_ADAPTER").unwrap_or_default(),
                interval_seconds: env::var("CACHE_INTERVAL")
                    .ok()
                    .and_then(|v| v.parse().ok()),
                connection_string: env::var("CACHE_CONN").unwrap_or_default(),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache: CacheOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(
            config.cache.into_config().unwrap(),
            CacheConfig::Memory(MemoryConfig {
                interval_seconds: 60
            })
        );
    }

    #[test]
    fn test_options_require_conn_for_non_memory() {
        let options = CacheOptions {
            adapter: "file".to_string(),
            ..Default::default()
        };
        assert!(matches!(options.into_config(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_options_file_adapter() {
        let options = CacheOptions {
            adapter: "file".to_string(),
            interval_seconds: Some(0),
            connection_string: "data/cache".to_string(),
        };
        assert_eq!(
            options.into_config().unwrap(),
            CacheConfig::File(FileConfig::new("data/cache", 0))
        );
    }

    #[test]
    fn test_options_unknown_adapter() {
        let options = CacheOptions {
            adapter: "ledis".to_string(),
            connection_string: "x".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            options.into_config(),
            Err(CacheError::UnknownAdapter(name)) if name == "ledis"
        ));
    }

    #[test]
    fn test_redis_conn_str_full() {
        let config =
            RedisConfig::from_conn_str("addr=10.0.0.1:6380, password=pw, db=2, key=Idx, interval=5")
                .unwrap();
        assert_eq!(config.addr, "10.0.0.1:6380");
        assert_eq!(config.password.as_deref(), Some("pw"));
        assert_eq!(config.db, 2);
        assert_eq!(config.index_key, "Idx");
        assert_eq!(config.interval_seconds, 5);
        assert_eq!(config.network, "tcp");
    }

    #[test]
    fn test_redis_conn_str_bare_addr() {
        let config = RedisConfig::from_conn_str("127.0.0.1:6379").unwrap();
        assert_eq!(config.addr, "127.0.0.1:6379");
        assert_eq!(config.index_key, DEFAULT_INDEX_KEY);
    }

    #[test]
    fn test_redis_conn_str_rejects_unknown_option() {
        let err = RedisConfig::from_conn_str("addr=:6379,poolsize=10").unwrap_err();
        assert!(err.to_string().contains("poolsize"));
    }

    #[test]
    fn test_redis_conn_str_bad_number() {
        let result = RedisConfig::from_conn_str("addr=:6379,db=zero");
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_memcache_conn_str() {
        let config = MemcacheConfig::from_conn_str("127.0.0.1:11211").unwrap();
        assert_eq!(config.addr, "127.0.0.1:11211");
        assert_eq!(config.index_key, DEFAULT_INDEX_KEY);
        assert_eq!(config.interval_seconds, DEFAULT_GC_INTERVAL);

        let config = MemcacheConfig::from_conn_str("addr=mc:11211,key=Idx,interval=0").unwrap();
        assert_eq!(config.index_key, "Idx");
        assert_eq!(config.interval_seconds, 0);

        let err = MemcacheConfig::from_conn_str("addr=mc:11211,db=1").unwrap_err();
        assert!(err.to_string().contains("db"));
    }

    #[test]
    fn test_options_memcache_adapter() {
        let options = CacheOptions {
            adapter: "memcache".to_string(),
            interval_seconds: None,
            connection_string: "127.0.0.1:11211".to_string(),
        };
        let config = options.into_config().unwrap();
        assert_eq!(config.adapter_name(), "memcache");
    }

    #[test]
    fn test_tagged_config_from_json() {
        let json = r#"{"adapter":"file","rootPath":"/tmp/c","intervalSeconds":5}"#;
        let config: CacheConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, CacheConfig::File(FileConfig::new("/tmp/c", 5)));
        assert_eq!(config.adapter_name(), "file");

        let json = r#"{"adapter":"memory"}"#;
        let config: CacheConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, CacheConfig::Memory(MemoryConfig::default()));
    }
}
