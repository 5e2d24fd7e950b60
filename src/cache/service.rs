//! Cache Orchestrator
//!
//! `CacheService` puts the memory tier in front of a durable store: reads go
//! memory first, then durable (promoting hits), writes land in memory and are
//! mirrored to durable storage when small or high-priority.
//!
//! The memory-tier lock is only ever held for synchronous bookkeeping; every
//! durable-store await happens after the guard is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::durable::{decode_entry, encode_entry};
use crate::cache::store::Lookup;
use crate::cache::{
    CacheEntry, CacheStats, Clock, DurableStore, JsonSerializer, MemoryTier, PayloadSerializer,
    SystemClock,
};
use crate::config::Config;
use crate::error::Result;
use crate::models::{CacheOptions, Priority};
use crate::tasks::spawn_cleanup_task;

// == Settings ==
/// The slice of `Config` the orchestrator needs.
#[derive(Debug, Clone)]
struct CacheSettings {
    default_ttl_ms: u64,
    max_storage_size: u64,
    durable_size_threshold: u64,
    compression_threshold: usize,
    storage_key_prefix: String,
    cleanup_interval: Duration,
}

impl From<&Config> for CacheSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_ttl_ms: config.default_ttl_ms,
            max_storage_size: config.max_storage_size,
            durable_size_threshold: config.durable_size_threshold,
            compression_threshold: config.compression_threshold,
            storage_key_prefix: config.storage_key_prefix.clone(),
            cleanup_interval: config.cleanup_interval(),
        }
    }
}

// == Storage Index ==
/// Sizes of the values this process knows to be in the durable tier.
#[derive(Debug, Default)]
struct StorageIndex {
    sizes: HashMap<String, u64>,
    total: u64,
    /// Set once a scan of the durable tier has seeded the index
    loaded: bool,
}

impl StorageIndex {
    fn record(&mut self, storage_key: &str, size: u64) {
        if let Some(old) = self.sizes.insert(storage_key.to_string(), size) {
            self.total = self.total.saturating_sub(old);
        }
        self.total += size;
    }

    fn forget(&mut self, storage_key: &str) -> bool {
        match self.sizes.remove(storage_key) {
            Some(old) => {
                self.total = self.total.saturating_sub(old);
                true
            }
            None => false,
        }
    }

    fn size_of(&self, storage_key: &str) -> u64 {
        self.sizes.get(storage_key).copied().unwrap_or(0)
    }

    fn clear(&mut self) {
        self.sizes.clear();
        self.total = 0;
    }

    fn replace(&mut self, sizes: &[(String, u64)]) {
        self.clear();
        for (key, size) in sizes {
            self.record(key, *size);
        }
        self.loaded = true;
    }
}

struct Inner {
    memory: RwLock<MemoryTier>,
    durable: Arc<dyn DurableStore>,
    storage: Mutex<StorageIndex>,
    clock: Arc<dyn Clock>,
    serializer: Arc<dyn PayloadSerializer>,
    settings: CacheSettings,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

// == Cache Service ==
/// Two-tier cache handle. Clones share the same tiers and statistics.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

/// Non-owning handle held by the background sweep.
#[derive(Clone)]
pub struct WeakCacheService {
    inner: Weak<Inner>,
}

impl WeakCacheService {
    pub fn upgrade(&self) -> Option<CacheService> {
        self.inner.upgrade().map(|inner| CacheService { inner })
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl CacheService {
    // == Constructors ==
    /// Creates a cache and scans the durable tier so the storage ceiling
    /// accounts for data left by earlier runs.
    pub async fn open(config: &Config, durable: Arc<dyn DurableStore>) -> Self {
        let cache = Self::new(config, durable);
        cache.load_storage_stats().await;
        cache
    }

    /// Creates a cache using wall-clock time and JSON size accounting.
    ///
    /// The durable tier is scanned lazily, before the first mirror write.
    pub fn new(config: &Config, durable: Arc<dyn DurableStore>) -> Self {
        Self::with_parts(
            config,
            durable,
            Arc::new(SystemClock),
            Arc::new(JsonSerializer),
        )
    }

    /// Creates a cache with an explicit clock and payload serializer.
    pub fn with_parts(
        config: &Config,
        durable: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        serializer: Arc<dyn PayloadSerializer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory: RwLock::new(MemoryTier::new(config.max_memory_size)),
                durable,
                storage: Mutex::new(StorageIndex::default()),
                clock,
                serializer,
                settings: CacheSettings::from(config),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Current time according to the cache clock, in Unix milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    pub fn downgrade(&self) -> WeakCacheService {
        WeakCacheService {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // == Set ==
    /// Stores `data` under `key`, replacing any previous entry.
    ///
    /// Fails only when the payload cannot be serialized. Durable-tier
    /// problems are logged and leave the entry memory-only.
    pub async fn set<T>(&self, key: &str, data: &T, options: CacheOptions) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let settings = &self.inner.settings;
        let value = serde_json::to_value(data)?;
        let size = self.inner.serializer.size_of(&value)?;
        let ttl_ms = options
            .ttl
            .map(|ttl| ttl.as_millis() as u64)
            .filter(|ttl| *ttl > 0)
            .unwrap_or(settings.default_ttl_ms);
        let entry = CacheEntry::new(key, value, ttl_ms, size, self.inner.clock.now_ms());

        let mirror = options.priority == Priority::High || size < settings.durable_size_threshold;
        let durable_copy = mirror.then(|| entry.clone());

        let evicted = self.inner.memory.write().await.insert(entry);
        debug!(key, size, ttl_ms, mirror, "Cache set");

        match durable_copy {
            Some(entry) => self.mirror(&entry, options.compress).await,
            None => self.drop_stale_copy(key).await,
        }
        self.remove_durable(&evicted).await;
        Ok(())
    }

    // == Get ==
    /// Returns the cached payload, or `None` on a miss or a stale entry.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = self.inner.clock.now_ms();

        let lookup = self.inner.memory.write().await.lookup(key, now);
        match lookup {
            Lookup::Hit(data) => return Some(data),
            Lookup::Expired => {
                self.remove_durable(&[key.to_string()]).await;
                return None;
            }
            Lookup::Absent => {}
        }

        let stored = self.read_durable(key).await;

        let mut memory = self.inner.memory.write().await;
        // A set that completed while we were reading wins over the stored copy
        if memory.contains(key) {
            if let Lookup::Hit(data) = memory.lookup(key, now) {
                return Some(data);
            }
        }

        let Some(mut entry) = stored else {
            memory.record_miss();
            debug!(key, "Cache miss");
            return None;
        };
        entry.key = key.to_string();

        let (data, mut stale) = memory.promote(entry, now);
        drop(memory);

        if data.is_none() {
            stale.push(key.to_string());
        } else {
            debug!(key, "Promoted durable entry to memory");
        }
        self.remove_durable(&stale).await;
        data
    }

    /// Typed variant of `get`. A payload of the wrong shape reads as a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(key, "Cached payload has unexpected shape: {}", e);
                None
            }
        }
    }

    /// True when `get` would return data. Counts as a read.
    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    // == Delete ==
    /// Removes `key` from both tiers. Returns whether memory held it.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = self.inner.memory.write().await.remove(key).is_some();
        self.remove_durable(&[key.to_string()]).await;
        removed
    }

    // == Clear ==
    /// Empties both tiers and resets statistics.
    pub async fn clear(&self) {
        self.inner.memory.write().await.clear();
        self.inner.storage.lock().clear();

        let prefix = &self.inner.settings.storage_key_prefix;
        match self.inner.durable.get_all_keys().await {
            Ok(keys) => {
                let ours: Vec<String> = keys.into_iter().filter(|k| k.starts_with(prefix)).collect();
                if let Err(e) = self.inner.durable.multi_remove(&ours).await {
                    warn!("Failed to clear durable cache: {}", e);
                }
            }
            Err(e) => warn!("Failed to list durable cache keys: {}", e),
        }
        info!("Cache cleared");
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.inner.memory.read().await.stats();
        stats.storage_size = self.inner.storage.lock().total;
        stats
    }

    // == Cleanup Expired ==
    /// Active expiry: removes every stale memory entry (and its durable
    /// copy). Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let expired = self.inner.memory.write().await.remove_expired(now);
        self.remove_durable(&expired).await;
        expired.len()
    }

    // == Durable Stats ==
    /// Recomputes the durable-tier size by scanning every prefixed key.
    pub async fn load_storage_stats(&self) {
        let prefix = &self.inner.settings.storage_key_prefix;
        let keys = match self.inner.durable.get_all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to compute durable cache size: {}", e);
                return;
            }
        };

        let mut sizes = Vec::new();
        for key in keys.into_iter().filter(|k| k.starts_with(prefix)) {
            match self.inner.durable.get_item(&key).await {
                Ok(Some(value)) => sizes.push((key, value.len() as u64)),
                Ok(None) => {}
                Err(e) => warn!(key, "Failed to read durable cache value: {}", e),
            }
        }

        let mut storage = self.inner.storage.lock();
        storage.replace(&sizes);
        info!("Durable cache holds {} entries, {} bytes", sizes.len(), storage.total);
    }

    // == Prefetch ==
    /// Fills every missing key concurrently with low priority. Fetch
    /// failures are logged and skipped.
    pub async fn prefetch<F, Fut, E>(&self, keys: &[String], fetcher: F)
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: std::fmt::Display,
    {
        let fetcher = &fetcher;
        let tasks = keys.iter().map(|key| async move {
            if self.has(key).await {
                return;
            }
            match fetcher(key.clone()).await {
                Ok(data) => {
                    let options = CacheOptions::default().priority(Priority::Low);
                    if let Err(e) = self.set(key, &data, options).await {
                        warn!(key = key.as_str(), "Prefetch could not cache value: {}", e);
                    }
                }
                Err(e) => warn!(key = key.as_str(), "Prefetch failed: {}", e),
            }
        });
        join_all(tasks).await;
    }

    // == Sweep Lifecycle ==
    /// Starts the periodic active-expiry sweep, replacing a running one.
    pub fn start_cleanup(&self) {
        let handle = spawn_cleanup_task(self.downgrade(), self.inner.settings.cleanup_interval);
        if let Some(previous) = self.inner.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the periodic sweep. Cached data stays available.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
            info!("Cache sweep stopped");
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // == Durable Helpers ==
    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.inner.settings.storage_key_prefix, key)
    }

    async fn read_durable(&self, key: &str) -> Option<CacheEntry> {
        match self.inner.durable.get_item(&self.storage_key(key)).await {
            Ok(Some(stored)) => decode_entry(&stored),
            Ok(None) => None,
            Err(e) => {
                warn!(key, "Durable cache read failed: {}", e);
                None
            }
        }
    }

    async fn mirror(&self, entry: &CacheEntry, compress: bool) {
        let settings = &self.inner.settings;
        let storage_key = self.storage_key(&entry.key);
        let encoded = match encode_entry(entry, compress, settings.compression_threshold) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = entry.key.as_str(), "Could not encode entry for storage: {}", e);
                return;
            }
        };
        let size = encoded.len() as u64;

        if !self.inner.storage.lock().loaded {
            self.load_storage_stats().await;
        }
        let over_ceiling = {
            let storage = self.inner.storage.lock();
            storage.total - storage.size_of(&storage_key) + size > settings.max_storage_size
        };
        if over_ceiling {
            debug!(key = entry.key.as_str(), size, "Durable tier full, keeping entry in memory only");
            self.drop_stale_copy(&entry.key).await;
            return;
        }

        match self.inner.durable.set_item(&storage_key, encoded).await {
            Ok(()) => self.inner.storage.lock().record(&storage_key, size),
            Err(e) => warn!(key = entry.key.as_str(), "Durable cache write failed: {}", e),
        }
    }

    /// Removes an older durable copy so it cannot resurface after the new
    /// memory-only entry is evicted. The copy may predate this process, so
    /// the store is asked even when the index has no record of it.
    async fn drop_stale_copy(&self, key: &str) {
        let storage_key = self.storage_key(key);
        self.inner.storage.lock().forget(&storage_key);
        if let Err(e) = self.inner.durable.remove_item(&storage_key).await {
            warn!(key, "Durable cache remove failed: {}", e);
        }
    }

    async fn remove_durable(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        let storage_keys: Vec<String> = keys.iter().map(|k| self.storage_key(k)).collect();
        {
            let mut storage = self.inner.storage.lock();
            for key in &storage_keys {
                storage.forget(key);
            }
        }
        if let Err(e) = self.inner.durable.multi_remove(&storage_keys).await {
            warn!("Durable cache remove failed for {} keys: {}", storage_keys.len(), e);
        }
    }
}
