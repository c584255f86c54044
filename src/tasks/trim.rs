//! Periodic Trim Task
//!
//! Optional background sweep that trims records older than the cache's
//! maximum age. Expiry is already enforced on every read; this only reclaims
//! disk space held by records nobody asks for anymore.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::TieredCache;
use crate::codec::Codec;

/// Spawns a background task that calls
/// [`trim_expired`](TieredCache::trim_expired) every `interval`.
///
/// The task holds only a weak reference and stops by itself once the cache is
/// dropped. It also exits immediately when the cache has no maximum age.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = TieredCache::new(CacheConfig::named("avatars").with_max_age(week))?;
/// let trim_handle = spawn_trim_task(&cache, Duration::from_secs(3600));
/// // Later, during shutdown:
/// trim_handle.abort();
/// ```
pub fn spawn_trim_task<V, C>(cache: &TieredCache<V, C>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
    C: Codec<V>,
{
    let weak = cache.downgrade();
    let max_age = cache.config().max_age;
    let directory = cache.directory().display().to_string();

    cache.runtime().spawn(async move {
        if max_age.is_none() {
            debug!("No max age for {}; trim task not needed", directory);
            return;
        }
        info!(
            "Starting trim task for {} with interval of {:?}",
            directory, interval
        );

        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = weak.upgrade() else {
                debug!("Cache at {} dropped; trim task exiting", directory);
                break;
            };
            let pending = cache.trim_expired();
            drop(cache);

            let removed = pending.await;
            if removed > 0 {
                info!("Trim: removed {} expired records from {}", removed, directory);
            } else {
                debug!("Trim: no expired records in {}", directory);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Utf8Codec;
    use crate::config::CacheConfig;
    use tempfile::TempDir;

    fn open(tmp: &TempDir, max_age: Option<Duration>) -> TieredCache<String, Utf8Codec> {
        let mut config = CacheConfig::new(tmp.path().join("cache"));
        config.max_age = max_age;
        TieredCache::open(config, Utf8Codec).unwrap()
    }

    #[tokio::test]
    async fn test_trim_task_removes_expired_records() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, Some(Duration::from_millis(200)));

        assert!(cache.save("expire_soon", "value".to_string()).await);

        let handle = spawn_trim_task(&cache, Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert!(!cache.contains_in_memory("expire_soon"));
        assert_eq!(cache.disk_record_count().await, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_trim_task_preserves_fresh_records() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, Some(Duration::from_secs(3600)));

        assert!(cache.save("long_lived", "value".to_string()).await);

        let handle = spawn_trim_task(&cache, Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.fetch("long_lived").await.as_deref(), Some("value"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_trim_task_exits_without_max_age() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, None);

        let handle = spawn_trim_task(&cache, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_trim_task_exits_when_cache_dropped() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, Some(Duration::from_secs(60)));

        let handle = spawn_trim_task(&cache, Duration::from_millis(20));
        drop(cache);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_trim_task_can_be_aborted() {
        let tmp = TempDir::new().unwrap();
        let cache = open(&tmp, Some(Duration::from_secs(60)));

        let handle = spawn_trim_task(&cache, Duration::from_secs(1));
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
