//! Memory Table Module
//!
//! The synchronous tier: key -> (value, last access) behind one mutex.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::cache::{CacheEntry, RecencyIndex};

/// Outcome of a memory lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    /// Fresh value; its recency has been refreshed
    Hit(V),
    /// The entry was older than the maximum age and has been dropped
    Expired,
    /// Nothing cached in memory for this key
    Absent,
}

#[derive(Debug)]
struct MemoryState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Same keys as `entries`, ordered by last access
    recency: RecencyIndex<String>,
    /// Bumped by every removal
    epoch: u64,
}

// == Memory Table ==
/// Lock-protected in-memory table.
///
/// Unbounded: entries leave only through explicit removal, expiry, or a
/// memory-pressure purge. Every operation holds the lock for its full
/// duration, so no caller sees a half-applied update.
#[derive(Debug)]
pub struct MemoryTable<V> {
    state: Mutex<MemoryState<V>>,
}

impl<V> Default for MemoryTable<V> {
    fn default() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: HashMap::new(),
                recency: RecencyIndex::new(),
                epoch: 0,
            }),
        }
    }
}

impl<V: Clone> MemoryTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// Looks up a key, refreshing its recency on a hit.
    ///
    /// An entry older than `max_age` is removed (value and recency) and
    /// reported as [`Lookup::Expired`].
    pub fn get(&self, key: &str, max_age: Option<Duration>) -> Lookup<V> {
        let mut state = self.state.lock();
        let MemoryState {
            entries,
            recency,
            epoch,
        } = &mut *state;

        let Some(entry) = entries.get_mut(key) else {
            return Lookup::Absent;
        };

        if entry.is_expired(max_age) {
            entries.remove(key);
            recency.remove(&key.to_string());
            *epoch += 1;
            return Lookup::Expired;
        }

        let at = entry.touch();
        let value = entry.value.clone();
        recency.touch(&key.to_string(), at);
        Lookup::Hit(value)
    }

    // == Set ==
    /// Inserts or replaces a value; its recency becomes now.
    pub fn set(&self, key: &str, value: V) {
        let entry = CacheEntry::new(value);
        let at = entry.last_access;
        let key = key.to_string();

        let mut state = self.state.lock();
        state.recency.touch(&key, at);
        state.entries.insert(key, entry);
    }

    /// Removal counter. Take it before starting a disk read and hand it to
    /// [`populate`](Self::populate).
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Caches a value read from disk and returns the value the caller should
    /// see.
    ///
    /// A value already held wins, so a save racing with the read is never
    /// overwritten by older bytes. Nothing is inserted if any removal
    /// happened since `epoch` was taken, so an eviction or clear issued
    /// while the read was queued or running is not undone.
    pub fn populate(&self, key: &str, value: V, epoch: u64) -> V {
        let key = key.to_string();
        let mut state = self.state.lock();
        let MemoryState {
            entries,
            recency,
            epoch: current,
        } = &mut *state;

        if let Some(entry) = entries.get_mut(&key) {
            let at = entry.touch();
            recency.touch(&key, at);
            return entry.value.clone();
        }
        if *current != epoch {
            return value;
        }

        let entry = CacheEntry::new(value.clone());
        recency.touch(&key, entry.last_access);
        entries.insert(key, entry);
        value
    }

    // == Remove ==
    /// Drops the value and the recency of a key. Returns true if a value was held.
    pub fn remove(&self, key: &str) -> bool {
        let key = key.to_string();
        let mut state = self.state.lock();
        state.epoch += 1;
        state.recency.remove(&key);
        state.entries.remove(&key).is_some()
    }

    // == Remove All ==
    /// Drops every value with its recency. Returns the number of values
    /// dropped.
    pub fn remove_all(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.epoch += 1;
        state.entries.clear();
        state.recency.clear();
        count
    }

    // == Drain Older Than ==
    /// Removes, oldest first, every key last accessed strictly before
    /// `cutoff` and returns those keys.
    pub fn drain_older_than(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut state = self.state.lock();
        state.epoch += 1;
        let drained = state.recency.drain_older_than(cutoff);
        drained
            .into_iter()
            .map(|(key, _)| {
                state.entries.remove(&key);
                key
            })
            .collect()
    }

    /// Last recorded access of `key`.
    pub fn last_access(&self, key: &str) -> Option<DateTime<Utc>> {
        self.state.lock().recency.get(&key.to_string())
    }

    /// Keys with a recency record. Always equal to [`len`](Self::len).
    pub fn tracked_len(&self) -> usize {
        self.state.lock().recency.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}
