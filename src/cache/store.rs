//! Cache Store Module
//!
//! The two-tier cache facade. Memory updates happen synchronously on the
//! caller's thread; everything touching the disk goes through the instance's
//! serial worker, so disk operations on one cache are totally ordered while
//! separate caches run in parallel.

use std::path::Path;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::cache::entry::{expiry_cutoff, is_expired_at};
use crate::cache::memory::Lookup;
use crate::cache::{CacheStats, MemoryTable};
use crate::codec::{BincodeCodec, Codec};
use crate::config::CacheConfig;
use crate::disk::{encode_key, AttributeIndex, AttributeSnapshot, DiskStore};
use crate::error::{CacheError, Result};
use crate::tasks::pressure::spawn_pressure_listener;
use crate::tasks::{Completion, MemoryPressure, PressureSubscription, SerialWorker};

pub(crate) struct Inner<V, C> {
    config: CacheConfig,
    codec: C,
    memory: MemoryTable<V>,
    disk: DiskStore,
    /// Only touched from worker jobs; the lock just satisfies `Sync`
    index: Mutex<AttributeIndex>,
    stats: Mutex<CacheStats>,
    worker: SerialWorker,
    runtime: Handle,
}

// == Tiered Cache ==
/// Memory + disk key/value cache.
///
/// Cloning is cheap and yields another handle to the same cache. The cache
/// owns its directory: two instances must not share one.
///
/// No operation fails: disk errors are logged and turn into a miss, a no-op,
/// or a `false` from [`save`](Self::save). Callers treat a miss as "go to the
/// source of truth".
pub struct TieredCache<V, C = BincodeCodec<V>> {
    inner: Arc<Inner<V, C>>,
}

impl<V, C> Clone for TieredCache<V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> TieredCache<V, BincodeCodec<V>>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Opens a cache using the default binary codec.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::open(config, BincodeCodec::new())
    }
}

impl<V, C> TieredCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Codec<V>,
{
    // == Constructor ==
    /// Opens a cache rooted at `config.directory`, creating the directory
    /// (not its parents) if needed.
    ///
    /// Must be called from within a Tokio runtime, which hosts the serial
    /// worker and any background tasks.
    pub fn open(config: CacheConfig, codec: C) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|e| CacheError::RuntimeUnavailable(e.to_string()))?;

        let disk = DiskStore::new(&config.directory);
        disk.ensure_directory()?;

        let worker = SerialWorker::spawn(&runtime, config.directory.display().to_string());
        info!(
            "Opened cache at {} (max_age={:?}, max_disk_bytes={}, max_disk_records={})",
            config.directory.display(),
            config.max_age,
            config.max_disk_bytes,
            config.max_disk_records
        );

        Ok(Self {
            inner: Arc::new(Inner {
                index: Mutex::new(AttributeIndex::new(config.snapshot_resolution)),
                config,
                codec,
                memory: MemoryTable::new(),
                disk,
                stats: Mutex::new(CacheStats::new()),
                worker,
                runtime,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn directory(&self) -> &Path {
        self.inner.disk.directory()
    }

    // == Save ==
    /// Stores `value` under `key`.
    ///
    /// The memory tier is updated before this returns, so an immediate fetch
    /// sees the new value. The disk write and compaction are queued; the
    /// completion reports whether the write succeeded.
    pub fn save(&self, key: &str, value: V) -> Completion<bool> {
        if let Err(e) = encode_key(key) {
            warn!("Not saving {:?}: {}", key, e);
            return Completion::ready(false);
        }

        self.inner.memory.set(key, value.clone());

        let inner = self.inner.clone();
        let key = key.to_string();
        self.inner
            .worker
            .submit(move || inner.write_through(&key, &value))
    }

    // == Fetch ==
    /// Looks `key` up in memory, then on disk, dropping it from both tiers
    /// if it is older than the configured maximum age.
    ///
    /// Queued behind every disk operation already submitted to this cache.
    pub fn fetch(&self, key: &str) -> Completion<Option<V>> {
        if let Err(e) = encode_key(key) {
            warn!("Not fetching {:?}: {}", key, e);
            self.inner.stats.lock().record_miss();
            return Completion::ready(None);
        }

        // Removals issued after this point must not be undone by the read
        let epoch = self.inner.memory.epoch();
        let inner = self.inner.clone();
        let key = key.to_string();
        self.inner
            .worker
            .submit(move || inner.read_through(&key, epoch))
    }

    // == Evict ==
    /// Removes `key` from memory now and from disk once queued work drains.
    pub fn evict_object(&self, key: &str) -> Completion<()> {
        self.inner.memory.remove(key);

        let inner = self.inner.clone();
        let key = key.to_string();
        self.inner.worker.submit(move || {
            if inner.disk.remove(&key) {
                inner.index.lock().mark_dirty();
            }
        })
    }

    // == Trim ==
    /// Evicts, from both tiers, everything last read or written strictly
    /// before `cutoff`. Resolves to the number of disk records removed.
    pub fn trim_cache(&self, cutoff: DateTime<Utc>) -> Completion<usize> {
        let keys = self.inner.memory.drain_older_than(cutoff);

        let inner = self.inner.clone();
        self.inner.worker.submit(move || {
            let mut removed = keys.iter().filter(|key| inner.disk.remove(key)).count();

            let mut index = inner.index.lock();
            if removed > 0 {
                index.mark_dirty();
            }
            // Also catches files this instance never touched
            removed += index.trim(&inner.disk, cutoff);
            drop(index);

            inner.stats.lock().record_evictions(removed);
            if removed > 0 {
                info!(
                    "Trimmed {} records older than {} from {}",
                    removed,
                    cutoff,
                    inner.disk.directory().display()
                );
            }
            removed
        })
    }

    /// Trims everything older than the configured maximum age.
    /// Resolves to 0 when the age is unbounded.
    pub fn trim_expired(&self) -> Completion<usize> {
        match self
            .inner
            .config
            .max_age
            .and_then(|max_age| expiry_cutoff(max_age, Utc::now()))
        {
            Some(cutoff) => self.trim_cache(cutoff),
            None => Completion::ready(0),
        }
    }

    // == Clear ==
    /// Drops every value from the memory tier. The disk tier is untouched.
    /// Returns the number of entries dropped.
    pub fn clear_memory(&self) -> usize {
        self.inner.memory.remove_all()
    }

    /// Deletes every file in the cache directory once queued work drains.
    pub fn clear_disk(&self) -> Completion<usize> {
        let inner = self.inner.clone();
        self.inner.worker.submit(move || {
            let removed = inner.disk.clear_all();
            inner.index.lock().mark_dirty();
            debug!(
                "Cleared {} files from {}",
                removed,
                inner.disk.directory().display()
            );
            removed
        })
    }

    /// Empties both tiers. Resolves to the number of files removed.
    pub fn clear(&self) -> Completion<usize> {
        self.inner.memory.remove_all();
        self.clear_disk()
    }

    /// Resolves once every operation submitted before it has finished.
    pub fn flush(&self) -> Completion<()> {
        self.inner.worker.submit(|| ())
    }

    // == Memory Pressure ==
    /// Purges the memory tier whenever `signal` fires, until the returned
    /// subscription is dropped. Does not keep the cache alive.
    pub fn subscribe_memory_pressure(&self, signal: &MemoryPressure) -> PressureSubscription {
        let weak: Weak<Inner<V, C>> = Arc::downgrade(&self.inner);
        spawn_pressure_listener(&self.inner.runtime, signal.listen(), move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let purged = inner.memory.remove_all();
            info!(
                "Memory pressure: purged {} entries from {}",
                purged,
                inner.disk.directory().display()
            );
            true
        })
    }

    // == Introspection ==
    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.inner.stats.lock().clone();
        stats.memory_entries = self.inner.memory.len();
        stats
    }

    pub fn contains_in_memory(&self, key: &str) -> bool {
        self.inner.memory.contains(key)
    }

    /// Number of records currently on disk.
    pub fn disk_record_count(&self) -> Completion<usize> {
        let inner = self.inner.clone();
        self.inner
            .worker
            .submit(move || inner.disk.scan().map(|r| r.len()).unwrap_or(0))
    }

    /// Bytes currently used by records on disk.
    pub fn disk_usage_bytes(&self) -> Completion<u64> {
        let inner = self.inner.clone();
        self.inner.worker.submit(move || {
            inner
                .disk
                .scan()
                .map(|records| records.iter().map(|r| r.size).sum())
                .unwrap_or(0)
        })
    }

    /// The attribute index as compaction sees it, rebuilt first if dirty.
    pub fn attribute_snapshot(&self) -> Completion<Option<AttributeSnapshot>> {
        let inner = self.inner.clone();
        self.inner.worker.submit(move || {
            let mut index = inner.index.lock();
            index.refresh(&inner.disk).then(|| index.snapshot())
        })
    }

    pub(crate) fn downgrade(&self) -> WeakCache<V, C> {
        WeakCache(Arc::downgrade(&self.inner))
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }
}

/// Non-owning handle for background tasks.
pub(crate) struct WeakCache<V, C>(Weak<Inner<V, C>>);

impl<V, C> WeakCache<V, C> {
    pub(crate) fn upgrade(&self) -> Option<TieredCache<V, C>> {
        self.0.upgrade().map(|inner| TieredCache { inner })
    }
}

// == Worker-side Operations ==
impl<V, C> Inner<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: Codec<V>,
{
    fn write_through(&self, key: &str, value: &V) -> bool {
        let bytes = match self.codec.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Not writing {:?} to disk: {}", key, e);
                self.stats.lock().record_write_failure();
                return false;
            }
        };

        let Some(record) = self.disk.store(key, &bytes) else {
            // An older file left behind would resurface after a memory purge
            if self.disk.remove(key) {
                self.index.lock().mark_dirty();
            }
            self.stats.lock().record_write_failure();
            return false;
        };

        let mut index = self.index.lock();
        index.record(&record);
        let removed = index.compact(
            &self.disk,
            self.config.max_disk_records,
            self.config.max_disk_bytes,
        );
        drop(index);

        if removed > 0 {
            self.stats.lock().record_evictions(removed);
        }
        true
    }

    fn read_through(&self, key: &str, epoch: u64) -> Option<V> {
        let max_age = self.config.max_age;

        match self.memory.get(key, max_age) {
            Lookup::Hit(value) => {
                // Keep disk recency no older than the last read
                if let Some(record) = self.disk.touch(key) {
                    self.index.lock().record(&record);
                }
                self.stats.lock().record_memory_hit();
                debug!("Memory hit for {:?}", key);
                return Some(value);
            }
            Lookup::Expired => {
                self.expire_on_disk(key);
                return None;
            }
            Lookup::Absent => {}
        }

        if max_age.is_some()
            && self.disk.contains(key)
            && is_expired_at(self.disk.modification_time(key), max_age, Utc::now())
        {
            self.expire_on_disk(key);
            return None;
        }

        let Some((bytes, record)) = self.disk.load(key) else {
            self.stats.lock().record_miss();
            debug!("Miss for {:?}", key);
            return None;
        };
        self.index.lock().record(&record);

        match self.codec.decode(&bytes) {
            Ok(value) => {
                let value = self.memory.populate(key, value, epoch);
                self.stats.lock().record_disk_hit();
                debug!("Disk hit for {:?}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Ignoring unreadable record {:?}: {}", key, e);
                self.stats.lock().record_miss();
                None
            }
        }
    }

    fn expire_on_disk(&self, key: &str) {
        if self.disk.remove(key) {
            self.index.lock().mark_dirty();
        }
        let mut stats = self.stats.lock();
        stats.record_expired();
        stats.record_miss();
        debug!("Expired {:?}", key);
    }
}
