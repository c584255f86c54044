//! Cache Entry Module
//!
//! Defines the in-memory record and the age arithmetic shared by both tiers.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

// == Cache Entry ==
/// A value held in the memory tier together with its recency.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Time of the last successful read or write
    pub last_access: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    /// Creates an entry whose recency is now.
    pub fn new(value: V) -> Self {
        Self {
            value,
            last_access: Utc::now(),
        }
    }

    /// Marks the entry as read now and returns the new recency.
    pub fn touch(&mut self) -> DateTime<Utc> {
        self.last_access = Utc::now();
        self.last_access
    }

    /// Checks whether the entry outlived `max_age` since its last access.
    pub fn is_expired(&self, max_age: Option<Duration>) -> bool {
        is_expired_at(self.last_access, max_age, Utc::now())
    }
}

// == Age Helpers ==
/// Returns true when `recorded` is strictly more than `max_age` before `now`.
///
/// `None` means unbounded. A record stamped in the future (clock moved back)
/// has no measurable age and is treated as fresh.
pub fn is_expired_at(
    recorded: DateTime<Utc>,
    max_age: Option<Duration>,
    now: DateTime<Utc>,
) -> bool {
    let Some(max_age) = max_age else {
        return false;
    };
    match now.signed_duration_since(recorded).to_std() {
        Ok(age) => age > max_age,
        Err(_) => false,
    }
}

/// The instant before which records are older than `max_age`, or `None` when
/// that lies before any representable time.
pub fn expiry_cutoff(max_age: Duration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
}
