//! Single-flight lookups over the time-boxed cache.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::cache::TimedCache;

use super::api_types::parse_part_response;
use super::client::PartsClient;
use super::types::PartDetail;

/// Why a lookup produced no usable answer. None of these are cached, so the
/// next request for the same identifier retries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
  #[error("request for {key} failed: {message}")]
  Transport { key: String, message: String },
  #[error("malformed response for {key}: {reason}")]
  Malformed { key: String, reason: String },
  #[error("response for {requested} described {received}")]
  Mismatch { requested: String, received: String },
  #[error("lookup for {key} was aborted: {message}")]
  Task { key: String, message: String },
}

/// `Ok(None)` means the remote confirmed the identifier does not exist.
pub type LookupResult<V> = Result<Option<V>, FetchError>;

pub type PartResult = LookupResult<PartDetail>;

/// Name the part cache is persisted under.
pub const PART_CACHE_NAME: &str = "parts.cache";

/// One remote lookup by identifier.
#[async_trait]
pub trait Lookup: Send + Sync + 'static {
  type Value: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

  /// What is being looked up, for log lines.
  const KIND: &'static str;

  async fn lookup(&self, key: &str) -> LookupResult<Self::Value>;
}

type PendingLookup<V> = Shared<BoxFuture<'static, LookupResult<V>>>;
type PendingMap<V> = Arc<Mutex<HashMap<String, PendingLookup<V>>>>;

enum Next<V> {
  Cached(Option<V>),
  Wait(PendingLookup<V>),
}

/// Fetches values with caching and per-identifier request coalescing.
///
/// Concurrent callers asking for the same identifier share one network call
/// and observe the same result.
pub struct CachedFetcher<L: Lookup> {
  lookup: Arc<L>,
  cache: Arc<TimedCache<L::Value>>,
  pending: PendingMap<L::Value>,
}

/// Part data from the search-by-code API.
pub type PartFetcher = CachedFetcher<PartLookup>;

impl<L: Lookup> Clone for CachedFetcher<L> {
  fn clone(&self) -> Self {
    Self {
      lookup: Arc::clone(&self.lookup),
      cache: Arc::clone(&self.cache),
      pending: Arc::clone(&self.pending),
    }
  }
}

impl<L: Lookup> CachedFetcher<L> {
  pub fn new(lookup: L, cache: Arc<TimedCache<L::Value>>) -> Self {
    Self {
      lookup: Arc::new(lookup),
      cache,
      pending: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn cache(&self) -> &Arc<TimedCache<L::Value>> {
    &self.cache
  }

  /// Number of lookups currently on the wire.
  pub fn in_flight(&self) -> usize {
    self.lock_pending().len()
  }

  fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingLookup<L::Value>>> {
    self.pending.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Fetch the value with identifier `key`.
  ///
  /// 1. Cache hit (including a not-found tombstone) returns immediately
  /// 2. A lookup already in flight for `key` is joined
  /// 3. Otherwise a new lookup is issued and registered as in flight
  pub async fn fetch(&self, key: &str) -> LookupResult<L::Value> {
    match self.cached_or_pending(key) {
      Next::Cached(value) => Ok(value),
      Next::Wait(lookup) => lookup.await,
    }
  }

  fn cached_or_pending(&self, key: &str) -> Next<L::Value> {
    if let Some(cached) = self.cache.get(key) {
      debug!("Cache hit on {} {}", L::KIND, key);
      return Next::Cached(cached);
    }
    self.join_or_start(key)
  }

  fn join_or_start(&self, key: &str) -> Next<L::Value> {
    let mut pending = self.lock_pending();
    if let Some(lookup) = pending.get(key) {
      debug!("Joining in-flight lookup for {} {}", L::KIND, key);
      return Next::Wait(lookup.clone());
    }
    // A lookup that settled since the first check cached its result before
    // giving up its pending entry.
    if let Some(cached) = self.cache.get(key) {
      debug!("Cache hit on {} {}", L::KIND, key);
      return Next::Cached(cached);
    }

    debug!("Cache miss on {} {}, fetching", L::KIND, key);
    let lookup = self.start_lookup(key);
    pending.insert(key.to_string(), lookup.clone());
    Next::Wait(lookup)
  }

  /// Spawn the network call so it runs to completion even if every caller
  /// stops waiting.
  fn start_lookup(&self, key: &str) -> PendingLookup<L::Value> {
    let lookup = Arc::clone(&self.lookup);
    let cache = Arc::clone(&self.cache);
    let pending = Arc::clone(&self.pending);
    let task_key = key.to_string();

    // Called with the pending map locked, so the task cannot remove its entry
    // before the caller has inserted it.
    let task = tokio::spawn(async move {
      // Dropped on every exit path, before the result reaches any waiter.
      let _guard = PendingGuard {
        pending,
        key: task_key.clone(),
      };
      let result = lookup.lookup(&task_key).await;
      match &result {
        // A `None` here is remembered so confirmed-absent identifiers are
        // not re-requested.
        Ok(value) => cache.put(&task_key, value.clone()),
        Err(e) => warn!("Failed to read {} {}: {}", L::KIND, task_key, e),
      }
      result
    });

    let key = key.to_string();
    async move {
      match task.await {
        Ok(result) => result,
        Err(e) => Err(FetchError::Task {
          key,
          message: e.to_string(),
        }),
      }
    }
    .boxed()
    .shared()
  }
}

/// Removes the in-flight entry for `key` when the lookup settles.
struct PendingGuard<V> {
  pending: PendingMap<V>,
  key: String,
}

impl<V> Drop for PendingGuard<V> {
  fn drop(&mut self) {
    let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
    pending.remove(&self.key);
  }
}

/// Looks parts up on the search-by-code API.
pub struct PartLookup {
  client: PartsClient,
}

impl PartLookup {
  pub fn new(client: PartsClient) -> Self {
    Self { client }
  }
}

#[async_trait]
impl Lookup for PartLookup {
  type Value = PartDetail;
  const KIND: &'static str = "part";

  async fn lookup(&self, key: &str) -> PartResult {
    let response = self
      .client
      .get_part(key)
      .await
      .map_err(|e| FetchError::Transport {
        key: key.to_string(),
        message: e.to_string(),
      })?;

    let part = parse_part_response(key, response.status, &response.body)?;
    match &part {
      Some(_) => debug!("Got part data for {}", key),
      None => debug!("Part not found: {}", key),
    }
    Ok(part)
  }
}
