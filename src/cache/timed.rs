//! Time-boxed cache over a persistent key-value store.

use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::store::KeyValueStore;
use super::traits::{CacheEntry, Clock};

/// Default expiry window for cached lookups, in hours.
pub const DEFAULT_CACHE_PERIOD_HOURS: i64 = 24;

struct CacheState<V> {
  entries: HashMap<String, CacheEntry<V>>,
  /// Set by every mutation, cleared by a successful flush
  dirty: bool,
}

/// In-memory map of identifier -> entry, hydrated from and flushed to a
/// [`KeyValueStore`] under a single name.
///
/// Entries older than the period are evicted lazily on read.
pub struct TimedCache<V> {
  name: String,
  store: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
  period: Duration,
  state: Mutex<CacheState<V>>,
}

impl<V> TimedCache<V>
where
  V: Clone + Serialize + DeserializeOwned,
{
  /// Create an empty cache persisted under `name`.
  pub fn new(name: impl Into<String>, store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
    Self {
      name: name.into(),
      store,
      clock,
      period: Duration::hours(DEFAULT_CACHE_PERIOD_HOURS),
      state: Mutex::new(CacheState {
        entries: HashMap::new(),
        dirty: false,
      }),
    }
  }

  /// Set the expiry window.
  pub fn with_period(mut self, period: Duration) -> Self {
    self.period = period;
    self
  }

  pub fn period(&self) -> Duration {
    self.period
  }

  fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
    // Nothing panics while holding the lock, so a poisoned state is still consistent.
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Look up `key`.
  ///
  /// Returns `None` on a miss (never looked up, or expired and now evicted),
  /// `Some(None)` for a tombstone, and `Some(Some(value))` on a hit.
  pub fn get(&self, key: &str) -> Option<Option<V>> {
    let now = self.clock.now();
    let mut state = self.lock();

    let entry = state.entries.get(key)?;
    if entry.is_fresh(now, self.period) {
      return Some(entry.value.clone());
    }

    debug!(
      "Evicting {} from {} as it is {:.2} days old",
      key,
      self.name,
      days(entry.age(now))
    );
    state.entries.remove(key);
    state.dirty = true;
    None
  }

  /// Store `value` (or a tombstone) for `key`, replacing any previous entry.
  pub fn put(&self, key: &str, value: Option<V>) {
    let entry = CacheEntry::new(key, value, self.clock.now());
    let mut state = self.lock();
    state.entries.insert(key.to_string(), entry);
    state.dirty = true;
  }

  /// Number of entries currently held, including any not yet evicted.
  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_dirty(&self) -> bool {
    self.lock().dirty
  }

  /// Replace the in-memory map with the persisted one, dropping stale entries.
  ///
  /// Returns the number of entries evicted during hydration.
  pub fn load_all(&self) -> Result<usize> {
    let raw = self.store.read_or(&self.name, serde_json::Value::Object(Default::default()))?;

    let loaded: HashMap<String, CacheEntry<V>> = match serde_json::from_value(raw) {
      Ok(entries) => entries,
      Err(e) => {
        // Unreadable contents are discarded rather than blocking startup.
        warn!("Discarding unreadable {} contents: {}", self.name, e);
        HashMap::new()
      }
    };

    let now = self.clock.now();
    let loaded_count = loaded.len();
    let entries: HashMap<String, CacheEntry<V>> = loaded
      .into_iter()
      .filter(|(id, entry)| {
        let fresh = entry.is_fresh(now, self.period);
        if !fresh {
          debug!(
            "Evicting {} from {} as it is {:.2} days old",
            id,
            self.name,
            days(entry.age(now))
          );
        }
        fresh
      })
      .collect();

    let evicted = loaded_count - entries.len();
    info!("Loaded {} entries from {}", loaded_count, self.name);
    if evicted > 0 {
      info!(
        "Evicted {} expired entries from {}, {} remain",
        evicted,
        self.name,
        entries.len()
      );
    }

    let mut state = self.lock();
    state.entries = entries;
    state.dirty = evicted > 0;

    Ok(evicted)
  }

  /// Persist the map if anything changed since the last flush.
  ///
  /// Returns whether a write happened.
  pub fn flush_if_dirty(&self) -> Result<bool> {
    let snapshot = {
      let mut state = self.lock();
      if !state.dirty {
        return Ok(false);
      }
      let snapshot = serde_json::to_value(&state.entries)
        .map_err(|e| eyre!("Failed to serialize {}: {}", self.name, e))?;
      state.dirty = false;
      snapshot
    };

    if let Err(e) = self.store.write(&self.name, &snapshot) {
      self.lock().dirty = true;
      return Err(e);
    }
    info!("Saved {} to persistent storage", self.name);

    Ok(true)
  }
}

fn days(age: Duration) -> f64 {
  age.num_milliseconds() as f64 / Duration::days(1).num_milliseconds() as f64
}
