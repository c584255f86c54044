//! Recency Index Module
//!
//! Keeps keys ordered by their last access time so that "oldest first"
//! traversals (trimming, compaction) can stop at the first key that is new
//! enough.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use chrono::{DateTime, Utc};

/// Position of a key: its timestamp plus a tiebreaker for equal timestamps.
type Slot = (DateTime<Utc>, u64);

// == Recency Index ==
/// Keys sorted ascending by recency timestamp.
///
/// Keys touched with the same timestamp keep their touch order.
#[derive(Debug)]
pub struct RecencyIndex<K> {
    /// Oldest first
    order: BTreeMap<Slot, K>,
    /// Reverse lookup for O(log n) moves and removals
    slots: HashMap<K, Slot>,
    /// Monotonic tiebreaker
    seq: u64,
}

impl<K> Default for RecencyIndex<K> {
    fn default() -> Self {
        Self {
            order: BTreeMap::new(),
            slots: HashMap::new(),
            seq: 0,
        }
    }
}

impl<K: Eq + Hash + Clone> RecencyIndex<K> {
    // == Constructor ==
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Records `key` as accessed at `at`, replacing any earlier position.
    pub fn touch(&mut self, key: &K, at: DateTime<Utc>) {
        self.remove(key);
        self.seq += 1;
        let slot = (at, self.seq);
        self.order.insert(slot, key.clone());
        self.slots.insert(key.clone(), slot);
    }

    // == Remove ==
    /// Forgets a key. Returns its timestamp if it was tracked.
    pub fn remove(&mut self, key: &K) -> Option<DateTime<Utc>> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&slot);
        Some(slot.0)
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used key with its timestamp.
    pub fn pop_oldest(&mut self) -> Option<(K, DateTime<Utc>)> {
        let ((at, _), key) = self.order.pop_first()?;
        self.slots.remove(&key);
        Some((key, at))
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<(&K, DateTime<Utc>)> {
        self.order
            .first_key_value()
            .map(|((at, _), key)| (key, *at))
    }

    // == Drain Older Than ==
    /// Removes and returns, oldest first, every key touched strictly before
    /// `cutoff`. Stops at the first key that is not older.
    pub fn drain_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<(K, DateTime<Utc>)> {
        let mut drained = Vec::new();
        while let Some((_, at)) = self.peek_oldest() {
            if at >= cutoff {
                break;
            }
            if let Some(item) = self.pop_oldest() {
                drained.push(item);
            }
        }
        drained
    }

    /// Timestamp recorded for `key`.
    pub fn get(&self, key: &K) -> Option<DateTime<Utc>> {
        self.slots.get(key).map(|slot| slot.0)
    }

    /// Iterates keys oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, DateTime<Utc>)> {
        self.order.iter().map(|((at, _), key)| (key, *at))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.slots.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(secs)
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_index_new() {
        let index = RecencyIndex::<String>::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert!(index.peek_oldest().is_none());
    }

    #[test]
    fn test_touch_orders_by_timestamp_not_insertion() {
        let mut index = RecencyIndex::new();

        index.touch(&key("late"), t(30));
        index.touch(&key("early"), t(10));
        index.touch(&key("middle"), t(20));

        let order: Vec<&String> = index.iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_touch_existing_key_moves_it() {
        let mut index = RecencyIndex::new();

        index.touch(&key("a"), t(1));
        index.touch(&key("b"), t(2));
        index.touch(&key("a"), t(3));

        assert_eq!(index.len(), 2);
        assert_eq!(index.peek_oldest(), Some((&key("b"), t(2))));
        assert_eq!(index.get(&key("a")), Some(t(3)));
    }

    #[test]
    fn test_equal_timestamps_keep_touch_order() {
        let mut index = RecencyIndex::new();

        index.touch(&key("first"), t(5));
        index.touch(&key("second"), t(5));

        assert_eq!(index.pop_oldest(), Some((key("first"), t(5))));
        assert_eq!(index.pop_oldest(), Some((key("second"), t(5))));
        assert_eq!(index.pop_oldest(), None);
    }

    #[test]
    fn test_remove() {
        let mut index = RecencyIndex::new();

        index.touch(&key("a"), t(1));
        index.touch(&key("b"), t(2));

        assert_eq!(index.remove(&key("a")), Some(t(1)));
        assert_eq!(index.remove(&key("missing")), None);
        assert!(!index.contains(&key("a")));
        assert!(index.contains(&key("b")));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_drain_older_than_stops_at_cutoff() {
        let mut index = RecencyIndex::new();

        index.touch(&key("a"), t(1));
        index.touch(&key("b"), t(2));
        index.touch(&key("c"), t(3));
        index.touch(&key("d"), t(4));

        // Strictly older: t(3) itself survives
        let drained = index.drain_older_than(t(3));
        assert_eq!(drained, vec![(key("a"), t(1)), (key("b"), t(2))]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.peek_oldest(), Some((&key("c"), t(3))));
    }

    #[test]
    fn test_clear() {
        let mut index = RecencyIndex::new();
        index.touch(&key("a"), t(1));
        index.clear();
        assert!(index.is_empty());
        assert!(index.drain_older_than(t(100)).is_empty());
    }
}
