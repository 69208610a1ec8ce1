//! File Adapter
//!
//! Stores each entry as its own file under a hash-sharded directory tree.
//! Expired entries are removed lazily on read and by a periodic sweep that
//! discovers them purely by walking the tree.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::cache::{codec, system_clock, validate_key, Cache, CacheEntry, CacheValue, Clock, KeyHasher};
use crate::config::FileConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_gc_task, GcState, Sweep, SweepReport};

/// Suffix of files still being written.
const TEMP_SUFFIX: &str = ".tmp";

// == File Cache ==
/// Cache adapter persisting entries on the local filesystem.
#[derive(Debug)]
pub struct FileCache {
    hasher: KeyHasher,
    clock: Arc<dyn Clock>,
    /// Files that fail to decode are only deleted once older than this
    grace: Duration,
    gc_state: GcState,
    temp_seq: AtomicU64,
}

impl FileCache {
    // == Constructor ==
    /// Prepares the root directory and spawns the sweeper when
    /// `interval_seconds >= 1`. Relative roots resolve against the current
    /// working directory.
    pub async fn start_and_gc(config: FileConfig) -> Result<Arc<Self>> {
        Self::start_with_clock(config, system_clock()).await
    }

    /// Like [`FileCache::start_and_gc`] with an injected clock.
    pub async fn start_with_clock(config: FileConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        if config.root_path.as_os_str().is_empty() {
            return Err(CacheError::Config("file: root path is empty".to_string()));
        }

        let root = if config.root_path.is_absolute() {
            config.root_path
        } else {
            std::env::current_dir()?.join(config.root_path)
        };
        fs::create_dir_all(&root).await?;

        let cache = Arc::new(Self {
            hasher: KeyHasher::new(root),
            clock,
            grace: Duration::from_secs(config.interval_seconds.max(1)),
            gc_state: GcState::for_interval(config.interval_seconds),
            temp_seq: AtomicU64::new(0),
        });

        spawn_gc_task(&cache, config.interval_seconds);
        info!(
            root = %cache.root().display(),
            "File cache started (gc interval {}s)",
            config.interval_seconds
        );
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        self.hasher.root()
    }

    pub fn gc_state(&self) -> GcState {
        self.gc_state
    }

    /// Counts entry files currently on disk, expired ones included.
    pub async fn entry_count(&self) -> Result<usize> {
        let mut count = 0;
        for path in self.walk().await? {
            if !is_temp(&path) {
                count += 1;
            }
        }
        Ok(count)
    }

    // == Entry Store ==
    async fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        codec::decode(&data).map(Some)
    }

    /// Writes to a sibling temp file, then renames over the target so
    /// readers never observe a partial entry.
    async fn write_entry(&self, path: &Path, entry: &CacheEntry) -> Result<()> {
        let data = codec::encode(entry)?;

        let parent = path
            .parent()
            .ok_or_else(|| CacheError::Medium(format!("{} has no parent", path.display())))?;
        fs::create_dir_all(parent).await?;

        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("entry");
        let temp = parent.join(format!(
            ".{}.{}.{}{}",
            file_name,
            std::process::id(),
            seq,
            TEMP_SUFFIX
        ));

        fs::write(&temp, &data).await?;
        if let Err(e) = fs::rename(&temp, path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_entry(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the entry for `key`, deleting it if it has expired.
    async fn load_live(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.hasher.path_for(key);
        match self.read_entry(&path).await? {
            Some(entry) if entry.is_expired(self.clock.now()) => {
                if self.evict(&path, &entry).await? {
                    debug!(key, "Evicted expired entry on read");
                    return Ok(None);
                }
                // Replaced by a concurrent put since the first read.
                let now = self.clock.now();
                Ok(self.read_entry(&path).await?.filter(|e| !e.is_expired(now)))
            }
            other => Ok(other),
        }
    }

    /// Deletes `path` only if it still holds `seen`, so an entry renamed into
    /// place by a concurrent `put` after `seen` was read survives. Returns
    /// false when the file changed or vanished. A rename landing between the
    /// re-read and the unlink is still lost.
    async fn evict(&self, path: &Path, seen: &CacheEntry) -> Result<bool> {
        match self.read_entry(path).await? {
            Some(current) if current == *seen => {
                self.remove_entry(path).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Read path shared by `get` and `is_exist`: every failure is a miss.
    async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        if key.is_empty() {
            return None;
        }
        match self.load_live(key).await {
            Ok(entry) => entry,
            Err(CacheError::CorruptEntry(reason)) => {
                debug!(key, %reason, "Unreadable entry treated as a miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "File cache read failed");
                None
            }
        }
    }

    // == Counter Update ==
    async fn add(&self, key: &str, delta: i64) -> Result<()> {
        let entry = match self.load_live(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) | Err(CacheError::CorruptEntry(_)) => {
                return Err(CacheError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e),
        };

        let updated = entry.with_value(entry.value.add(delta)?);
        self.write_entry(&self.hasher.path_for(key), &updated).await
    }

    // == Directory Walk ==
    /// Lists every file below the root.
    async fn walk(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root().to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) if dir.as_path() == self.root() => return Err(e.into()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable cache directory");
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(dir = %dir.display(), error = %e, "Stopped listing cache directory");
                        break;
                    }
                };
                // The file may vanish between listing and stat.
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        debug!(path = %entry.path().display(), error = %e, "Skipping cache entry");
                        continue;
                    }
                };
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(entry.path());
                }
            }
        }

        Ok(files)
    }

    /// True if the file was last modified longer ago than the grace period.
    async fn is_stale(&self, path: &Path) -> bool {
        let modified = match fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age >= self.grace)
            .unwrap_or(false)
    }

    /// Handles a file that is not (yet) a readable entry.
    async fn reclaim_if_stale(&self, path: &Path, report: &mut SweepReport) {
        if !self.is_stale(path).await {
            report.skipped += 1;
            return;
        }
        match self.remove_entry(path).await {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "GC could not remove file");
                report.skipped += 1;
            }
        }
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
}

#[async_trait]
impl Cache for FileCache {
    fn adapter_name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        self.lookup(key).await.map(|entry| entry.value)
    }

    async fn put(&self, key: &str, value: CacheValue, ttl: u64) -> Result<()> {
        validate_key(key)?;
        let entry = CacheEntry::new(value, ttl, self.clock.now());
        self.write_entry(&self.hasher.path_for(key), &entry).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        self.remove_entry(&self.hasher.path_for(key)).await
    }

    async fn incr(&self, key: &str) -> Result<()> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<()> {
        self.add(key, -1).await
    }

    async fn is_exist(&self, key: &str) -> bool {
        self.lookup(key).await.is_some()
    }

    async fn clear_all(&self) -> Result<()> {
        match fs::remove_dir_all(self.root()).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(self.root()).await?;
        info!(root = %self.root().display(), "File cache cleared");
        Ok(())
    }
}

#[async_trait]
impl Sweep for FileCache {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let files = match self.walk().await {
            Ok(files) => files,
            Err(e) => {
                warn!(root = %self.root().display(), error = %e, "GC could not walk cache root");
                return report;
            }
        };

        for path in files {
            report.scanned += 1;

            if is_temp(&path) {
                self.reclaim_if_stale(&path, &mut report).await;
                continue;
            }

            match self.read_entry(&path).await {
                Ok(Some(entry)) if entry.is_expired(self.clock.now()) => {
                    match self.evict(&path, &entry).await {
                        Ok(true) => report.removed += 1,
                        Ok(false) => debug!(path = %path.display(), "Entry rewritten during GC"),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "GC could not remove entry");
                            report.skipped += 1;
                        }
                    }
                }
                Ok(_) => {}
                Err(CacheError::CorruptEntry(reason)) => {
                    warn!(path = %path.display(), %reason, "GC found undecodable entry");
                    self.reclaim_if_stale(&path, &mut report).await;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "GC skipped unreadable entry");
                    report.skipped += 1;
                }
            }
        }

        report
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use tempfile::TempDir;

    async fn manual_cache(tmp: &TempDir) -> (Arc<FileCache>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = FileCache::start_with_clock(
            FileConfig::new(tmp.path().join("cache"), 0),
            clock.clone(),
        )
        .await
        .unwrap();
        (cache, clock)
    }

    #[tokio::test]
    async fn test_put_lands_in_sharded_path() {
        let tmp = TempDir::new().unwrap();
        let (cache, _) = manual_cache(&tmp).await;

        cache.put("user:1", "ada".into(), 0).await.unwrap();

        let digest = crate::cache::hasher::digest("user:1");
        let expected = cache
            .root()
            .join(&digest[0..1])
            .join(&digest[1..2])
            .join(&digest);
        assert!(expected.is_file());
        assert_eq!(cache.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_roundtrip_and_overwrite() {
        let tmp = TempDir::new().unwrap();
        let (cache, _) = manual_cache(&tmp).await;

        cache.put("k", CacheValue::Int(1), 0).await.unwrap();
        cache.put("k", "two".into(), 0).await.unwrap();

        assert_eq!(cache.get("k").await, Some(CacheValue::from("two")));
        assert_eq!(cache.entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_root_is_config_error() {
        let result = FileCache::start_and_gc(FileConfig::new("", 0)).await;
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_lazy_expiration_deletes_file() {
        let tmp = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(&tmp).await;

        cache.put("k", "v".into(), 3).await.unwrap();
        assert!(cache.is_exist("k").await);

        clock.advance(3);

        assert!(!cache.is_exist("k").await);
        assert_eq!(cache.entry_count().await.unwrap(), 0);
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let tmp = TempDir::new().unwrap();
        let (cache, _) = manual_cache(&tmp).await;

        cache.delete("never-set").await.unwrap();
        cache.put("k", "v".into(), 0).await.unwrap();
        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();

        assert!(!cache.is_exist("k").await);
    }

    #[tokio::test]
    async fn test_counter_keeps_created_at() {
        let tmp = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(&tmp).await;

        cache.put("counter", CacheValue::Int(1), 10).await.unwrap();
        clock.advance(9);
        cache.incr("counter").await.unwrap();
        assert_eq!(cache.get("counter").await, Some(CacheValue::Int(2)));

        clock.advance(1);
        assert_eq!(cache.get("counter").await, None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_miss() {
        let tmp = TempDir::new().unwrap();
        let (cache, _) = manual_cache(&tmp).await;

        cache.put("k", "v".into(), 0).await.unwrap();
        let path = cache.hasher.path_for("k");
        std::fs::write(&path, b"{\"value\":").unwrap();

        assert_eq!(cache.get("k").await, None);
        assert!(!cache.is_exist("k").await);
        assert!(matches!(cache.incr("k").await, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_and_keeps_live() {
        let tmp = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(&tmp).await;

        for i in 0..10 {
            cache.put(&format!("short{}", i), CacheValue::Int(i), 1).await.unwrap();
        }
        cache.put("forever", "v".into(), 0).await.unwrap();
        cache.put("long", "v".into(), 3600).await.unwrap();

        clock.advance(1);
        let report = cache.sweep().await;

        assert_eq!(report.scanned, 12);
        assert_eq!(report.removed, 10);
        assert_eq!(report.skipped, 0);
        assert_eq!(cache.entry_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sweep_skips_fresh_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(&tmp).await;

        cache.put("expired", "v".into(), 1).await.unwrap();
        cache.put("broken", "v".into(), 1).await.unwrap();
        std::fs::write(cache.hasher.path_for("broken"), b"garbage").unwrap();

        clock.advance(5);
        let report = cache.sweep().await;

        assert_eq!(report.removed, 1, "Decodable expired entry is still removed");
        assert_eq!(report.skipped, 1, "Freshly written corrupt file is left alone");
        assert!(cache.hasher.path_for("broken").exists());
    }

    #[tokio::test]
    async fn test_sweep_reclaims_stale_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let (cache, _) = manual_cache(&tmp).await;

        cache.put("broken", "v".into(), 0).await.unwrap();
        std::fs::write(cache.hasher.path_for("broken"), b"garbage").unwrap();

        // Grace period is one second when GC is disabled.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let report = cache.sweep().await;

        assert_eq!(report.removed, 1);
        assert_eq!(cache.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_evict_spares_entry_rewritten_after_read() {
        let tmp = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(&tmp).await;

        cache.put("k", "old".into(), 1).await.unwrap();
        let path = cache.hasher.path_for("k");
        let seen = cache.read_entry(&path).await.unwrap().unwrap();

        clock.advance(5);
        cache.put("k", "new".into(), 0).await.unwrap();

        assert!(!cache.evict(&path, &seen).await.unwrap());
        assert_eq!(cache.get("k").await, Some(CacheValue::from("new")));

        let current = cache.read_entry(&path).await.unwrap().unwrap();
        assert!(cache.evict(&path, &current).await.unwrap());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sweep_walks_past_foreign_entries() {
        let tmp = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(&tmp).await;

        cache.put("a", "v".into(), 1).await.unwrap();
        cache.put("b", "v".into(), 1).await.unwrap();
        let shard = cache.hasher.path_for("a").parent().unwrap().to_path_buf();
        std::os::unix::fs::symlink(tmp.path().join("missing"), shard.join("dangling")).unwrap();
        std::fs::create_dir_all(cache.root().join("f").join("empty")).unwrap();

        clock.advance(1);
        let report = cache.sweep().await;

        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed, 2);
        assert_eq!(cache.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_all_resets_root() {
        let tmp = TempDir::new().unwrap();
        let (cache, _) = manual_cache(&tmp).await;

        for i in 0..50 {
            cache.put(&format!("key{}", i), CacheValue::Int(i), 0).await.unwrap();
        }
        cache.clear_all().await.unwrap();

        assert!(cache.root().is_dir());
        assert_eq!(std::fs::read_dir(cache.root()).unwrap().count(), 0);
        for i in 0..50 {
            assert!(!cache.is_exist(&format!("key{}", i)).await);
        }
    }
}
