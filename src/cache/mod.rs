//! Persistent, time-boxed caching.
//!
//! This module provides:
//! - A durable key-value store abstraction with SQLite and in-memory backends
//! - A cache of identifier -> value with a fixed expiry window, lazy eviction
//!   and tombstones for confirmed-absent identifiers
//! - Dirty tracking so periodic flushes only write when something changed

mod store;
mod timed;
mod traits;

pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use timed::{TimedCache, DEFAULT_CACHE_PERIOD_HOURS};
pub use traits::{CacheEntry, Clock, SystemClock};

#[cfg(test)]
pub(crate) use traits::testing;
