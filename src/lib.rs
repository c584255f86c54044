//! Tiered Cache - an embedded two-tier key/value cache
//!
//! Values live in a lock-protected memory table and, through a pluggable
//! codec, as one file per key in a cache directory. Records expire by age
//! since their last read or write, and disk usage is bounded by record count
//! and total bytes.
//!
//! ```ignore
//! let cache: TieredCache<Vec<u8>, RawCodec> =
//!     TieredCache::open(CacheConfig::named("thumbnails"), RawCodec)?;
//! let _ = cache.save("https://example.com/a.png", bytes);
//! if let Some(bytes) = cache.fetch("https://example.com/a.png").await {
//!     // hit
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod disk;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, TieredCache};
pub use codec::{BincodeCodec, Codec, FnCodec, JsonCodec, RawCodec, Utf8Codec};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::{spawn_trim_task, Completion, MemoryPressure, PressureSubscription};
