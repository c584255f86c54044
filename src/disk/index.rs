//! Attribute Index Module
//!
//! A cached summary of the files in the cache directory, ordered oldest
//! first, used to decide what compaction evicts without listing the
//! directory on every write.
//!
//! The index is rebuilt from a full directory scan only when it is dirty:
//! never built, explicitly invalidated, or the directory's own mtime moved
//! more than the resolution window past the snapshot time. Between rebuilds
//! the cache keeps it current itself by recording each write and read, so
//! eviction order follows read recency without waiting for a rebuild.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::RecencyIndex;
use crate::disk::{DiskRecord, DiskStore};

// == Attribute Snapshot ==
/// Point-in-time copy of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSnapshot {
    /// Sum of `entries` sizes
    pub total_size: u64,
    /// Oldest first
    pub entries: Vec<DiskRecord>,
    /// When the index was last rebuilt from disk
    pub snapshot_time: Option<DateTime<Utc>>,
}

// == Attribute Index ==
#[derive(Debug)]
pub struct AttributeIndex {
    order: RecencyIndex<PathBuf>,
    sizes: HashMap<PathBuf, u64>,
    total_size: u64,
    snapshot_time: Option<DateTime<Utc>>,
    dirty: bool,
    resolution: Duration,
}

impl AttributeIndex {
    /// Creates an empty, dirty index.
    pub fn new(resolution: Duration) -> Self {
        Self {
            order: RecencyIndex::new(),
            sizes: HashMap::new(),
            total_size: 0,
            snapshot_time: None,
            dirty: true,
            resolution,
        }
    }

    // == Dirty Check ==
    /// Whether sizes and ordering must be rebuilt before they are trusted.
    pub fn is_dirty(&self, directory_modified: Option<DateTime<Utc>>) -> bool {
        let Some(snapshot_time) = self.snapshot_time else {
            return true;
        };
        if self.dirty {
            return true;
        }
        match directory_modified {
            Some(modified) => modified
                .signed_duration_since(snapshot_time)
                .to_std()
                .map(|drift| drift > self.resolution)
                .unwrap_or(false),
            // Directory vanished or unreadable
            None => true,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // == Rebuild ==
    /// Replaces the index contents with `records`.
    pub fn rebuild(&mut self, mut records: Vec<DiskRecord>) {
        records.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

        self.order.clear();
        self.sizes.clear();
        self.total_size = 0;
        for record in &records {
            self.record(record);
        }
        self.snapshot_time = Some(Utc::now());
        self.dirty = false;
    }

    /// Rebuilds from a directory scan if dirty. Returns false when the index
    /// is still untrustworthy afterwards.
    pub fn refresh(&mut self, disk: &DiskStore) -> bool {
        if !self.is_dirty(disk.directory_modified()) {
            return true;
        }
        match disk.scan() {
            Ok(records) => {
                self.rebuild(records);
                debug!(
                    "Rebuilt attribute index: {} records, {} bytes",
                    self.len(),
                    self.total_size
                );
                true
            }
            Err(e) => {
                warn!(
                    "Failed to scan cache directory {}: {}",
                    disk.directory().display(),
                    e
                );
                self.dirty = true;
                false
            }
        }
    }

    // == Record ==
    /// Inserts or refreshes one file after it was written or read.
    pub fn record(&mut self, record: &DiskRecord) {
        if let Some(old) = self.sizes.insert(record.path.clone(), record.size) {
            self.total_size -= old;
        }
        self.total_size += record.size;
        self.order.touch(&record.path, record.modified);
    }

    /// Drops one file from the index.
    pub fn forget(&mut self, path: &Path) -> Option<u64> {
        let path = path.to_path_buf();
        self.order.remove(&path);
        let size = self.sizes.remove(&path)?;
        self.total_size -= size;
        Some(size)
    }

    /// Removes and returns the oldest file with its size.
    pub fn pop_oldest(&mut self) -> Option<(PathBuf, u64)> {
        let (path, _) = self.order.pop_oldest()?;
        let size = self.sizes.remove(&path).unwrap_or(0);
        self.total_size -= size;
        Some((path, size))
    }

    pub fn exceeds(&self, max_records: usize, max_bytes: u64) -> bool {
        self.len() > max_records || self.total_size > max_bytes
    }

    // == Compaction ==
    /// Deletes oldest files until both limits hold. Returns the number of
    /// files removed.
    pub fn compact(&mut self, disk: &DiskStore, max_records: usize, max_bytes: u64) -> usize {
        if !self.refresh(disk) {
            return 0;
        }

        let mut removed = 0;
        let mut lost_track = false;
        while self.exceeds(max_records, max_bytes) {
            let Some((path, _)) = self.pop_oldest() else {
                break;
            };
            if disk.remove_path(&path) {
                removed += 1;
            } else if path.exists() {
                lost_track = true;
            }
        }

        if lost_track {
            self.dirty = true;
        }
        if removed > 0 {
            info!(
                "Compaction removed {} records, {} remain ({} bytes)",
                removed,
                self.len(),
                self.total_size
            );
        }
        removed
    }

    // == Trim ==
    /// Deletes every file last modified strictly before `cutoff`, oldest
    /// first. Returns the number of files removed.
    pub fn trim(&mut self, disk: &DiskStore, cutoff: DateTime<Utc>) -> usize {
        if !self.refresh(disk) {
            return 0;
        }

        let mut removed = 0;
        for (path, _) in self.order.drain_older_than(cutoff) {
            if let Some(size) = self.sizes.remove(&path) {
                self.total_size -= size;
            }
            if disk.remove_path(&path) {
                removed += 1;
            }
        }
        removed
    }

    pub fn snapshot(&self) -> AttributeSnapshot {
        let entries = self
            .order
            .iter()
            .map(|(path, modified)| DiskRecord {
                path: path.clone(),
                size: self.sizes.get(path).copied().unwrap_or(0),
                modified,
            })
            .collect();
        AttributeSnapshot {
            total_size: self.total_size,
            entries,
            snapshot_time: self.snapshot_time,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::fs;
    use tempfile::TempDir;

    fn record(name: &str, size: u64, secs: i64) -> DiskRecord {
        DiskRecord {
            path: PathBuf::from(name),
            size,
            modified: DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(secs),
        }
    }

    fn disk_in(tmp: &TempDir) -> DiskStore {
        let disk = DiskStore::new(tmp.path().join("cache"));
        disk.ensure_directory().unwrap();
        disk
    }

    #[test]
    fn test_new_index_is_dirty() {
        let index = AttributeIndex::new(Duration::from_secs(1));
        assert!(index.is_dirty(Some(Utc::now())));
        assert!(index.is_empty());
    }

    #[test]
    fn test_rebuild_sorts_oldest_first_and_sums_sizes() {
        let mut index = AttributeIndex::new(Duration::from_secs(1));
        index.rebuild(vec![
            record("c", 30, 3),
            record("a", 10, 1),
            record("b", 20, 2),
        ]);

        let snapshot = index.snapshot();
        let names: Vec<_> = snapshot.entries.iter().map(|r| r.path.clone()).collect();
        assert_eq!(
            names,
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
        assert_eq!(snapshot.total_size, 60);
        assert!(snapshot.snapshot_time.is_some());
    }

    #[test]
    fn test_dirty_after_directory_drift() {
        let mut index = AttributeIndex::new(Duration::from_secs(1));
        index.rebuild(Vec::new());
        let built = index.snapshot().snapshot_time.unwrap();

        assert!(!index.is_dirty(Some(built)));
        assert!(!index.is_dirty(Some(built + TimeDelta::milliseconds(500))));
        assert!(index.is_dirty(Some(built + TimeDelta::seconds(2))));
        assert!(index.is_dirty(None));

        index.mark_dirty();
        assert!(index.is_dirty(Some(built)));
    }

    #[test]
    fn test_record_replaces_size_and_position() {
        let mut index = AttributeIndex::new(Duration::from_secs(1));
        index.rebuild(vec![record("a", 10, 1), record("b", 20, 2)]);

        index.record(&record("a", 15, 5));

        assert_eq!(index.total_size(), 35);
        assert_eq!(index.pop_oldest(), Some((PathBuf::from("b"), 20)));
        assert_eq!(index.total_size(), 15);
    }

    #[test]
    fn test_forget() {
        let mut index = AttributeIndex::new(Duration::from_secs(1));
        index.rebuild(vec![record("a", 10, 1)]);

        assert_eq!(index.forget(Path::new("a")), Some(10));
        assert_eq!(index.forget(Path::new("a")), None);
        assert_eq!(index.total_size(), 0);
    }

    #[test]
    fn test_compact_by_record_count() {
        let tmp = TempDir::new().unwrap();
        let disk = disk_in(&tmp);
        let mut index = AttributeIndex::new(Duration::from_secs(60));

        for i in 0..5 {
            disk.write(&format!("k{i}"), b"xx");
        }
        // Scan order is arbitrary; give the files a definite age order
        index.refresh(&disk);
        for i in 0..5 {
            let mut r = record("", 2, i);
            r.path = disk.path_for(&format!("k{i}")).unwrap();
            index.record(&r);
        }

        assert_eq!(index.compact(&disk, 3, u64::MAX), 2);
        assert!(!disk.contains("k0"));
        assert!(!disk.contains("k1"));
        assert!(disk.contains("k2") && disk.contains("k3") && disk.contains("k4"));
        assert_eq!(index.len(), 3);
        assert_eq!(index.total_size(), 6);
    }

    #[test]
    fn test_compact_by_size() {
        let tmp = TempDir::new().unwrap();
        let disk = disk_in(&tmp);
        let mut index = AttributeIndex::new(Duration::from_secs(60));
        index.refresh(&disk);

        for (i, key) in ["old", "mid", "new"].iter().enumerate() {
            let mut r = disk.store(key, &[0u8; 100]).unwrap();
            r.modified = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(i as i64);
            index.record(&r);
        }

        assert_eq!(index.compact(&disk, 1000, 250), 1);
        assert!(!disk.contains("old"));
        assert_eq!(index.total_size(), 200);
    }

    #[test]
    fn test_compact_rebuilds_when_dirty() {
        let tmp = TempDir::new().unwrap();
        let disk = disk_in(&tmp);
        let mut index = AttributeIndex::new(Duration::from_secs(60));

        // Files the index has never heard of
        for i in 0..4 {
            disk.write(&format!("k{i}"), b"abc");
        }

        assert_eq!(index.compact(&disk, 2, u64::MAX), 2);
        assert_eq!(disk.scan().unwrap().len(), 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_trim_removes_only_older_files() {
        let tmp = TempDir::new().unwrap();
        let disk = disk_in(&tmp);
        let mut index = AttributeIndex::new(Duration::from_secs(60));
        index.refresh(&disk);

        let now = Utc::now();
        for (key, age_secs) in [("stale", 120), ("fresh", 0)] {
            let mut r = disk.store(key, b"v").unwrap();
            r.modified = now - TimeDelta::seconds(age_secs);
            index.record(&r);
        }

        assert_eq!(index.trim(&disk, now - TimeDelta::seconds(60)), 1);
        assert!(!disk.contains("stale"));
        assert!(disk.contains("fresh"));
    }

    #[test]
    fn test_snapshot_total_matches_files_after_rebuild() {
        let tmp = TempDir::new().unwrap();
        let disk = disk_in(&tmp);
        disk.write("a", &[1u8; 7]);
        disk.write("b", &[1u8; 11]);
        fs::write(disk.directory().join(".a.part"), [0u8; 1000]).unwrap();

        let mut index = AttributeIndex::new(Duration::from_secs(1));
        assert!(index.refresh(&disk));

        let actual: u64 = disk.scan().unwrap().iter().map(|r| r.size).sum();
        assert_eq!(index.total_size(), actual);
        assert_eq!(actual, 18);
    }
}
