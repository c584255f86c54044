//! Configuration Module
//!
//! Per-instance cache configuration, with defaults, builder-style setters and
//! loading from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Directory name used under the platform cache directory by default.
pub const DEFAULT_CACHE_NAME: &str = "com.tiered.cache";

/// Default disk budget: 10 MiB.
pub const DEFAULT_MAX_DISK_BYTES: u64 = 10 * 1024 * 1024;

/// Default maximum number of records kept on disk.
pub const DEFAULT_MAX_DISK_RECORDS: usize = 1000;

/// Default window within which directory changes do not invalidate the
/// attribute snapshot.
pub const DEFAULT_SNAPSHOT_RESOLUTION: Duration = Duration::from_secs(1);

/// Cache configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory holding one file per key. Owned exclusively by one cache.
    pub directory: PathBuf,
    /// Maximum age of a record since its last read or write, `None` = unbounded
    pub max_age: Option<Duration>,
    /// Upper bound on the summed size of all files on disk
    pub max_disk_bytes: u64,
    /// Upper bound on the number of files on disk
    pub max_disk_records: usize,
    /// Directory mtime drift tolerated before the attribute snapshot is rebuilt
    pub snapshot_resolution: Duration,
}

impl CacheConfig {
    /// Creates a config with default limits rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Creates a config for a named cache under the platform cache directory.
    pub fn named(name: &str) -> Self {
        Self::new(platform_cache_root().join(name))
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_max_disk_bytes(mut self, bytes: u64) -> Self {
        self.max_disk_bytes = bytes;
        self
    }

    pub fn with_max_disk_records(mut self, records: usize) -> Self {
        self.max_disk_records = records;
        self
    }

    pub fn with_snapshot_resolution(mut self, resolution: Duration) -> Self {
        self.snapshot_resolution = resolution;
        self
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Cache directory (default: `<platform cache dir>/com.tiered.cache`)
    /// - `CACHE_MAX_AGE_SECS` - Maximum record age in seconds (default: unbounded)
    /// - `CACHE_MAX_DISK_BYTES` - Disk budget in bytes (default: 10 MiB)
    /// - `CACHE_MAX_DISK_RECORDS` - Maximum files on disk (default: 1000)
    /// - `CACHE_SNAPSHOT_RESOLUTION_MS` - Snapshot resolution in ms (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            directory: env::var("CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.directory),
            max_age: env::var("CACHE_MAX_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .or(defaults.max_age),
            max_disk_bytes: env::var("CACHE_MAX_DISK_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_disk_bytes),
            max_disk_records: env::var("CACHE_MAX_DISK_RECORDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_disk_records),
            snapshot_resolution: env::var("CACHE_SNAPSHOT_RESOLUTION_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.snapshot_resolution),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: platform_cache_root().join(DEFAULT_CACHE_NAME),
            max_age: None,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            max_disk_records: DEFAULT_MAX_DISK_RECORDS,
            snapshot_resolution: DEFAULT_SNAPSHOT_RESOLUTION,
        }
    }
}

fn platform_cache_root() -> PathBuf {
    dirs::cache_dir().unwrap_or_else(env::temp_dir)
}
