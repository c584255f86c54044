//! Cache Module
//!
//! The memory tier and the facade that layers it over the disk tier.

mod entry;
mod memory;
mod recency;
mod stats;
mod store;


// Re-export public types
pub use entry::{expiry_cutoff, is_expired_at, CacheEntry};
pub use memory::{Lookup, MemoryTable};
pub use recency::RecencyIndex;
pub use stats::CacheStats;
pub use store::TieredCache;
