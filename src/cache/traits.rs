//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source of the current time.
///
/// Cache expiry is computed against this rather than `Utc::now()` directly so
/// the expiry window can be exercised without sleeping.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A single cached lookup result.
///
/// `value` is `None` for a tombstone: the identifier was looked up and the
/// remote confirmed it does not exist. That is a cache hit, distinct from the
/// identifier never having been looked up (no entry at all).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
  pub id: String,
  pub value: Option<V>,
  pub stored_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
  pub fn new(id: impl Into<String>, value: Option<V>, stored_at: DateTime<Utc>) -> Self {
    Self {
      id: id.into(),
      value,
      stored_at,
    }
  }

  /// Age of the entry relative to `now`.
  pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
    now - self.stored_at
  }

  /// An entry is valid while its age does not exceed the period.
  pub fn is_fresh(&self, now: DateTime<Utc>, period: chrono::Duration) -> bool {
    self.age(now) <= period
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  #[test]
  fn test_entry_fresh_at_boundary() {
    let stored = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let entry = CacheEntry::new("C1", Some(1u32), stored);
    let period = Duration::hours(24);

    assert!(entry.is_fresh(stored + period, period));
    assert!(!entry.is_fresh(stored + period + Duration::milliseconds(1), period));
  }

  #[test]
  fn test_tombstone_serializes_as_null() {
    let stored = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let entry: CacheEntry<u32> = CacheEntry::new("C404", None, stored);
    let json = serde_json::to_value(&entry).unwrap();
    assert!(json["value"].is_null());
    assert_eq!(json["id"], "C404");
  }
}
