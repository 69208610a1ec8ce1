//! Side-Indexed Adapter
//!
//! TTL bookkeeping for networked stores that expire keys natively but cannot
//! enumerate them. Every key written is also recorded in an auxiliary index
//! (key -> expiry timestamp, `0` = never) kept inside the same backend.
//!
//! Write order is always primary first, index second. A failed index write
//! can therefore leak a record in the index, never a value in the primary
//! store. The sweep reconciles: index records whose primary key is gone are
//! pruned. The backend's native TTL stays authoritative for expiry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cache::{codec, expiry, validate_key, Cache, CacheValue, Clock};
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_gc_task, GcState, Sweep, SweepReport};

// == Remote Store ==
/// Client operations the side-index protocol needs from a backend.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Backend name used in logs and as the adapter name.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value`; a non-zero `ttl` must be enforced by the backend.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically adds `delta` to an existing integer, preserving its TTL.
    /// Returns `None` if the key does not exist, and [`CacheError::Type`]
    /// when the backend's counter primitive cannot apply the delta to the
    /// stored bytes.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<Option<i64>>;

    /// Overwrites `key` only if it exists, keeping its native expiry.
    /// Backends that cannot keep it re-apply `ttl` (0 = never). Returns
    /// false if the key was absent.
    async fn replace(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<bool>;

    async fn index_get(&self, index: &str, key: &str) -> Result<Option<i64>>;

    async fn index_set(&self, index: &str, key: &str, expires_at: i64) -> Result<()>;

    async fn index_remove(&self, index: &str, key: &str) -> Result<()>;

    async fn index_entries(&self, index: &str) -> Result<Vec<(String, i64)>>;

    async fn index_clear(&self, index: &str) -> Result<()>;
}

// == Indexed Cache ==
/// Cache adapter layering a side index over a [`RemoteStore`].
pub struct IndexedCache<S: RemoteStore> {
    store: S,
    index_key: String,
    clock: Arc<dyn Clock>,
    gc_state: GcState,
}

impl<S: RemoteStore> IndexedCache<S> {
    /// Wraps `store` and spawns the index sweeper when `interval_seconds >= 1`.
    pub fn start(
        store: S,
        index_key: impl Into<String>,
        interval_seconds: u64,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let cache = Arc::new(Self {
            store,
            index_key: index_key.into(),
            clock,
            gc_state: GcState::for_interval(interval_seconds),
        });

        spawn_gc_task(&cache, interval_seconds);
        info!(
            index = %cache.index_key,
            "{} cache started (index gc interval {}s)",
            cache.store.name(),
            interval_seconds
        );
        cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    pub fn gc_state(&self) -> GcState {
        self.gc_state
    }

    async fn add(&self, key: &str, delta: i64) -> Result<()> {
        match self.store.incr_by(key, delta).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(CacheError::NotFound(key.to_string())),
            Err(CacheError::Type(reason)) => {
                debug!(key, %reason, "Native counter refused, updating decoded value");
                self.add_decoded(key, delta).await
            }
            Err(e) => Err(e),
        }
    }

    /// Counter update for values the backend primitive rejects, such as a
    /// numeric string in tagged form. Read-modify-write, so not atomic
    /// across concurrent callers.
    async fn add_decoded(&self, key: &str, delta: i64) -> Result<()> {
        let data = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        let next = codec::decode_wire(&data).add(delta)?;

        let ttl = match self.store.index_get(&self.index_key, key).await? {
            Some(expires_at) if expires_at != 0 => {
                u64::try_from(expires_at.saturating_sub(self.clock.now()))
                    .unwrap_or(0)
                    .max(1)
            }
            _ => 0,
        };

        if self
            .store
            .replace(key, codec::encode_wire(&next)?, ttl)
            .await?
        {
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }
}

#[async_trait]
impl<S: RemoteStore> Cache for IndexedCache<S> {
    fn adapter_name(&self) -> &'static str {
        self.store.name()
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        if key.is_empty() {
            return None;
        }
        match self.store.get(key).await {
            Ok(data) => data.map(|bytes| codec::decode_wire(&bytes)),
            Err(e) => {
                warn!(key, error = %e, "{} read failed", self.store.name());
                None
            }
        }
    }

    async fn put(&self, key: &str, value: CacheValue, ttl: u64) -> Result<()> {
        validate_key(key)?;
        let data = codec::encode_wire(&value)?;
        let expires_at = expiry::expires_at(self.clock.now(), ttl);

        self.store.set(key, data, ttl).await?;
        self.store.index_set(&self.index_key, key, expires_at).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        self.store.delete(key).await?;
        self.store.index_remove(&self.index_key, key).await
    }

    async fn incr(&self, key: &str) -> Result<()> {
        self.add(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<()> {
        self.add(key, -1).await
    }

    async fn is_exist(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        match self.store.exists(key).await {
            Ok(true) => true,
            Ok(false) => {
                if let Err(e) = self.store.index_remove(&self.index_key, key).await {
                    warn!(key, error = %e, "Could not prune index record");
                }
                false
            }
            Err(e) => {
                warn!(key, error = %e, "{} exists check failed", self.store.name());
                false
            }
        }
    }

    async fn clear_all(&self) -> Result<()> {
        for (key, _) in self.store.index_entries(&self.index_key).await? {
            self.store.delete(&key).await?;
        }
        self.store.index_clear(&self.index_key).await?;
        info!(index = %self.index_key, "{} cache cleared", self.store.name());
        Ok(())
    }
}

#[async_trait]
impl<S: RemoteStore> Sweep for IndexedCache<S> {
    fn name(&self) -> &'static str {
        self.store.name()
    }

    /// Prunes index records whose primary key no longer exists.
    ///
    /// Records are never trusted to delete primary values: a record can be
    /// older than a concurrent re-`put` of the same key.
    async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let records = match self.store.index_entries(&self.index_key).await {
            Ok(records) => records,
            Err(e) => {
                warn!(index = %self.index_key, error = %e, "GC could not read side index");
                return report;
            }
        };

        let now = self.clock.now();
        for (key, expires_at) in records {
            report.scanned += 1;

            match self.store.exists(&key).await {
                Ok(true) => {
                    if expires_at != 0 && now >= expires_at {
                        debug!(key = %key, "Index record past expiry but key still live");
                    }
                }
                Ok(false) => match self.store.index_remove(&self.index_key, &key).await {
                    Ok(()) => report.removed += 1,
                    Err(e) => {
                        warn!(key = %key, error = %e, "GC could not prune index record");
                        report.skipped += 1;
                    }
                },
                Err(e) => {
                    warn!(key = %key, error = %e, "GC skipped index record");
                    report.skipped += 1;
                }
            }
        }

        report
    }
}

// == Unit Tests ==
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-process stand-in for a networked store with native expiry.
    #[derive(Debug)]
    pub(crate) struct FakeStore {
        clock: Arc<ManualClock>,
        values: Mutex<HashMap<String, (Vec<u8>, i64)>>,
        index: Mutex<HashMap<String, HashMap<String, i64>>>,
        pub(crate) fail_index_writes: AtomicBool,
    }

    impl FakeStore {
        pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                clock,
                values: Mutex::new(HashMap::new()),
                index: Mutex::new(HashMap::new()),
                fail_index_writes: AtomicBool::new(false),
            }
        }

        fn live(&self, key: &str) -> Option<Vec<u8>> {
            let now = self.clock.now();
            let mut values = self.values.lock().unwrap();
            let (data, exp) = values.get(key)?.clone();
            if exp != 0 && now >= exp {
                values.remove(key);
                return None;
            }
            Some(data)
        }

        pub(crate) fn index_len(&self, index: &str) -> usize {
            self.index
                .lock()
                .unwrap()
                .get(index)
                .map(HashMap::len)
                .unwrap_or(0)
        }

        fn check_index_write(&self) -> Result<()> {
            if self.fail_index_writes.load(Ordering::SeqCst) {
                return Err(CacheError::Medium("index unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for FakeStore {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.live(key))
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: u64) -> Result<()> {
            let exp = expiry::expires_at(self.clock.now(), ttl);
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), (value, exp));
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.live(key).is_some())
        }

        async fn incr_by(&self, key: &str, delta: i64) -> Result<Option<i64>> {
            let Some(data) = self.live(key) else {
                return Ok(None);
            };
            let next = CacheValue::Bytes(data).add(delta)?;
            let n = next.as_i64().unwrap_or_default();
            if let Some(slot) = self.values.lock().unwrap().get_mut(key) {
                slot.0 = n.to_string().into_bytes();
            }
            Ok(Some(n))
        }

        async fn replace(&self, key: &str, value: Vec<u8>, _ttl: u64) -> Result<bool> {
            if self.live(key).is_none() {
                return Ok(false);
            }
            // Keeps the native expiry, like SET ... XX KEEPTTL.
            match self.values.lock().unwrap().get_mut(key) {
                Some(slot) => {
                    slot.0 = value;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn index_get(&self, index: &str, key: &str) -> Result<Option<i64>> {
            Ok(self
                .index
                .lock()
                .unwrap()
                .get(index)
                .and_then(|records| records.get(key).copied()))
        }

        async fn index_set(&self, index: &str, key: &str, expires_at: i64) -> Result<()> {
            self.check_index_write()?;
            self.index
                .lock()
                .unwrap()
                .entry(index.to_string())
                .or_default()
                .insert(key.to_string(), expires_at);
            Ok(())
        }

        async fn index_remove(&self, index: &str, key: &str) -> Result<()> {
            self.check_index_write()?;
            if let Some(records) = self.index.lock().unwrap().get_mut(index) {
                records.remove(key);
            }
            Ok(())
        }

        async fn index_entries(&self, index: &str) -> Result<Vec<(String, i64)>> {
            Ok(self
                .index
                .lock()
                .unwrap()
                .get(index)
                .map(|records| records.iter().map(|(k, v)| (k.clone(), *v)).collect())
                .unwrap_or_default())
        }

        async fn index_clear(&self, index: &str) -> Result<()> {
            self.index.lock().unwrap().remove(index);
            Ok(())
        }
    }

    fn fake_cache() -> (Arc<IndexedCache<FakeStore>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = FakeStore::new(clock.clone());
        let cache = IndexedCache::start(store, "Idx", 0, clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_put_records_expiry_in_index() {
        let (cache, _) = fake_cache();

        cache.put("a", "x".into(), 30).await.unwrap();
        cache.put("b", "y".into(), 0).await.unwrap();

        let mut records = cache.store().index_entries("Idx").await.unwrap();
        records.sort();
        assert_eq!(
            records,
            vec![("a".to_string(), 1_030), ("b".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_variants() {
        let (cache, _) = fake_cache();

        cache.put("int", CacheValue::Int(7), 0).await.unwrap();
        cache.put("str", "7".into(), 0).await.unwrap();
        cache
            .put("obj", CacheValue::Json(serde_json::json!({"a": [1, 2]})), 0)
            .await
            .unwrap();

        assert_eq!(cache.get("int").await, Some(CacheValue::Int(7)));
        assert_eq!(cache.get("str").await, Some(CacheValue::from("7")));
        assert_eq!(
            cache.get("obj").await,
            Some(CacheValue::Json(serde_json::json!({"a": [1, 2]})))
        );
    }

    #[tokio::test]
    async fn test_native_expiry_is_authoritative() {
        let (cache, clock) = fake_cache();

        cache.put("k", "v".into(), 5).await.unwrap();
        clock.advance(5);

        assert_eq!(cache.get("k").await, None);
        assert!(!cache.is_exist("k").await);
        assert_eq!(
            cache.store().index_len("Idx"),
            0,
            "is_exist prunes the index record of a missing key"
        );
    }

    #[tokio::test]
    async fn test_delete_removes_both_records() {
        let (cache, _) = fake_cache();

        cache.put("k", "v".into(), 0).await.unwrap();
        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();

        assert!(!cache.is_exist("k").await);
        assert_eq!(cache.store().index_len("Idx"), 0);
    }

    #[tokio::test]
    async fn test_counter_uses_backend_primitive() {
        let (cache, clock) = fake_cache();

        cache.put("n", CacheValue::Int(5), 10).await.unwrap();
        cache.incr("n").await.unwrap();
        cache.incr("n").await.unwrap();
        cache.decr("n").await.unwrap();
        assert_eq!(cache.get("n").await, Some(CacheValue::Int(6)));

        clock.advance(10);
        assert_eq!(cache.get("n").await, None, "Counter keeps its original TTL");
        assert!(matches!(cache.incr("n").await, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_counter_on_text_is_type_error() {
        let (cache, _) = fake_cache();

        cache.put("s", "hello".into(), 0).await.unwrap();
        assert!(matches!(cache.incr("s").await, Err(CacheError::Type(_))));
    }

    #[tokio::test]
    async fn test_numeric_string_counter_keeps_variant_and_ttl() {
        let (cache, clock) = fake_cache();

        cache.put("s", "5".into(), 10).await.unwrap();
        cache.incr("s").await.unwrap();
        cache.incr("s").await.unwrap();
        cache.decr("s").await.unwrap();
        assert_eq!(cache.get("s").await, Some(CacheValue::from("6")));

        cache.put("b", CacheValue::Bytes(b"-1".to_vec()), 0).await.unwrap();
        cache.incr("b").await.unwrap();
        assert_eq!(cache.get("b").await, Some(CacheValue::Bytes(b"0".to_vec())));

        clock.advance(10);
        assert_eq!(cache.get("s").await, None, "Counter keeps its original TTL");
        assert!(matches!(cache.incr("s").await, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_counter_overflow_is_type_error() {
        let (cache, _) = fake_cache();

        cache.put("max", CacheValue::Int(i64::MAX), 0).await.unwrap();
        assert!(matches!(cache.incr("max").await, Err(CacheError::Type(_))));
        assert_eq!(cache.get("max").await, Some(CacheValue::Int(i64::MAX)));
    }

    #[tokio::test]
    async fn test_failed_index_write_never_leaks_primary() {
        let (cache, _) = fake_cache();

        cache.put("k", "v".into(), 0).await.unwrap();
        cache.store().fail_index_writes.store(true, Ordering::SeqCst);

        assert!(cache.delete("k").await.is_err());
        assert!(!cache.is_exist("k").await, "Primary delete happened first");
        assert_eq!(cache.store().index_len("Idx"), 1, "Index record leaked");

        cache.store().fail_index_writes.store(false, Ordering::SeqCst);
        let report = cache.sweep().await;

        assert_eq!(report.removed, 1);
        assert_eq!(cache.store().index_len("Idx"), 0);
    }

    #[tokio::test]
    async fn test_sweep_prunes_expired_records_only() {
        let (cache, clock) = fake_cache();

        for i in 0..5 {
            cache.put(&format!("short{}", i), CacheValue::Int(i), 1).await.unwrap();
        }
        cache.put("forever", "v".into(), 0).await.unwrap();

        clock.advance(1);
        let report = cache.sweep().await;

        assert_eq!(report.scanned, 6);
        assert_eq!(report.removed, 5);
        assert_eq!(cache.store().index_len("Idx"), 1);
        assert!(cache.is_exist("forever").await);
    }

    #[tokio::test]
    async fn test_clear_all_uses_index() {
        let (cache, _) = fake_cache();

        for i in 0..50 {
            cache.put(&format!("k{}", i), CacheValue::Int(i), 0).await.unwrap();
        }
        cache.clear_all().await.unwrap();

        for i in 0..50 {
            assert!(!cache.is_exist(&format!("k{}", i)).await);
        }
        assert_eq!(cache.store().index_len("Idx"), 0);
    }
}
