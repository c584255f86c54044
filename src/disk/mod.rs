//! Disk Module
//!
//! Directory-backed tier: key encoding, file persistence and the attribute
//! index that bounds disk usage.

mod index;
pub mod keys;
mod store;

pub use index::{AttributeIndex, AttributeSnapshot};
pub use keys::{decode_key, encode_key};
pub use store::{DiskRecord, DiskStore};
