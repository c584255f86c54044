//! Background Tasks Module
//!
//! Asynchronous machinery around the cache.
//!
//! # Tasks
//! - Serial worker: runs one cache's disk jobs in order
//! - Memory pressure: purges memory tiers when signalled
//! - Trim: optionally sweeps expired records at a fixed interval

pub(crate) mod pressure;
mod trim;
mod worker;

pub use pressure::{MemoryPressure, PressureSubscription};
pub use trim::spawn_trim_task;
pub use worker::{Completion, SerialWorker};
