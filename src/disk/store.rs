//! Disk Store Module
//!
//! One regular file per key directly inside the cache directory. A file's
//! modification time is the record's recency: it is set on write and
//! refreshed on every read.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::disk::keys::{encode_key, is_reserved_name, temp_name};
use crate::error::{CacheError, Result};

// == Disk Record ==
/// Size and recency of one file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

// == Disk Store ==
/// Directory-backed persistence.
///
/// Never fails across its boundary: I/O errors are logged and reported as
/// `false` / `None`. Not synchronized; callers serialize access.
#[derive(Debug, Clone)]
pub struct DiskStore {
    directory: PathBuf,
}

impl DiskStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    // == Ensure Directory ==
    /// Creates the cache directory (not its parents). Idempotent.
    pub fn ensure_directory(&self) -> Result<()> {
        match fs::create_dir(&self.directory) {
            Ok(()) => {
                debug!("Created cache directory {}", self.directory.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && self.directory.is_dir() => Ok(()),
            Err(source) => Err(CacheError::DirectoryCreationFailed {
                path: self.directory.clone(),
                source,
            }),
        }
    }

    /// File that holds `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        Ok(self.directory.join(encode_key(key)?))
    }

    // == Write ==
    /// Creates or replaces the file for `key`. Returns the success flag.
    pub fn write(&self, key: &str, bytes: &[u8]) -> bool {
        self.store(key, bytes).is_some()
    }

    /// Writes `bytes` for `key` and stamps the file with the current time.
    ///
    /// The data goes to a hidden temp file first and is renamed into place,
    /// so a reader never observes a partially written record.
    pub fn store(&self, key: &str, bytes: &[u8]) -> Option<DiskRecord> {
        let path = self.checked_path(key)?;
        let now = SystemTime::now();

        match write_atomically(&path, bytes, now) {
            Ok(()) => Some(DiskRecord {
                path,
                size: bytes.len() as u64,
                modified: DateTime::from(now),
            }),
            Err(source) => {
                warn!("{}", CacheError::FileWriteFailed { path, source });
                None
            }
        }
    }

    // == Read ==
    /// Returns the bytes for `key` and refreshes the file's modification time.
    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.load(key).map(|(bytes, _)| bytes)
    }

    /// Like [`read`](Self::read), also returning the refreshed attributes.
    pub fn load(&self, key: &str) -> Option<(Vec<u8>, DiskRecord)> {
        let path = self.checked_path(key)?;
        let now = SystemTime::now();

        let result = File::open(&path).and_then(|mut file| {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        match result {
            Ok(bytes) => {
                let modified = refresh_after_read(&path, now);
                let record = DiskRecord {
                    path,
                    size: bytes.len() as u64,
                    modified,
                };
                Some((bytes, record))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                warn!("{}", CacheError::FileReadFailed { path, source });
                None
            }
        }
    }

    // == Touch ==
    /// Refreshes the modification time of `key`'s file without reading it.
    pub fn touch(&self, key: &str) -> Option<DiskRecord> {
        let path = self.checked_path(key)?;
        let now = SystemTime::now();

        let result = OpenOptions::new().write(true).open(&path).and_then(|file| {
            stamp(&file, now)?;
            file.metadata()
        });

        match result {
            Ok(meta) => Some(DiskRecord {
                path,
                size: meta.len(),
                modified: DateTime::from(now),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                debug!("Could not refresh {}: {}", path.display(), e);
                None
            }
        }
    }

    // == Remove ==
    /// Deletes the file for `key`. Returns true if a file was removed;
    /// absence is not an error.
    pub fn remove(&self, key: &str) -> bool {
        match self.path_for(key) {
            Ok(path) => self.remove_path(&path),
            Err(_) => false,
        }
    }

    /// Deletes one file inside the cache directory.
    pub fn remove_path(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                false
            }
        }
    }

    // == Clear All ==
    /// Deletes every regular file in the cache directory, without descending
    /// into subdirectories. Returns the number of files removed.
    pub fn clear_all(&self) -> usize {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Failed to list cache directory {}: {}",
                    self.directory.display(),
                    e
                );
                return 0;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| self.remove_path(&entry.path()))
            .count()
    }

    // == Modification Time ==
    /// Recency of `key` on disk, or now when it cannot be determined.
    pub fn modification_time(&self, key: &str) -> DateTime<Utc> {
        self.path_for(key)
            .ok()
            .and_then(|path| fs::metadata(path).ok())
            .and_then(|meta| meta.modified().ok())
            .map(DateTime::from)
            .unwrap_or_else(Utc::now)
    }

    /// True when a file exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    // == Scan ==
    /// Lists every cache record (regular, non-hidden files) with its size
    /// and modification time, in directory order.
    pub fn scan(&self) -> io::Result<Vec<DiskRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if is_reserved_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                // Removed between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            let modified = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
            records.push(DiskRecord {
                path: entry.path(),
                size: meta.len(),
                modified,
            });
        }
        Ok(records)
    }

    /// Modification time of the cache directory itself.
    pub fn directory_modified(&self) -> Option<DateTime<Utc>> {
        fs::metadata(&self.directory)
            .and_then(|meta| meta.modified())
            .map(DateTime::from)
            .ok()
    }

    fn checked_path(&self, key: &str) -> Option<PathBuf> {
        match self.path_for(key) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(temp_name(&name))
}

fn write_atomically(path: &Path, bytes: &[u8], now: SystemTime) -> io::Result<()> {
    let tmp = temp_path_for(path);
    let result = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        stamp(&file, now)?;
        drop(file);
        fs::rename(&tmp, path)
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Best-effort mtime refresh after a read. Returns the recency the file
/// ends up with.
fn refresh_after_read(path: &Path, now: SystemTime) -> DateTime<Utc> {
    match OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| stamp(&file, now))
    {
        Ok(()) => DateTime::from(now),
        Err(e) => {
            debug!("Could not refresh {}: {}", path.display(), e);
            fs::metadata(path)
                .and_then(|meta| meta.modified())
                .map(DateTime::from)
                .unwrap_or_else(|_| DateTime::from(now))
        }
    }
}

fn stamp(file: &File, at: SystemTime) -> io::Result<()> {
    file.set_times(FileTimes::new().set_modified(at).set_accessed(at))
}
