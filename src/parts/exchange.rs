//! Exchange-rate resolution for converting USD prices into the page currency.

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cache::{Clock, KeyValueStore, DEFAULT_CACHE_PERIOD_HOURS};

use super::api_types::parse_exchange_rate;
use super::client::PartsClient;
use super::fetcher::FetchError;
use super::types::ExchangeRate;

/// Name the rate state is persisted under.
pub const EXCHANGE_RATE_NAME: &str = "exchange.rate";

/// Search used to find an item priced in both currencies.
pub const DEFAULT_PROBE_QUERY: &str = "C25804";

/// Persisted rate state. Cleared in full whenever the page currency changes
/// or the rate outlives the cache period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateState {
  pub rate: Option<f64>,
  pub currency_code: Option<String>,
  #[serde(default)]
  pub currency_symbol: String,
  pub stored_at: Option<DateTime<Utc>>,
}

impl ExchangeRateState {
  fn fresh_rate(&self, now: DateTime<Utc>, period: Duration) -> Option<ExchangeRate> {
    let rate = self.rate?;
    let stored_at = self.stored_at?;
    if now - stored_at > period {
      return None;
    }
    Some(ExchangeRate {
      rate,
      symbol: self.currency_symbol.clone(),
    })
  }

  fn clear_rate(&mut self) {
    self.rate = None;
    self.currency_symbol.clear();
    self.stored_at = None;
  }
}

pub type RateResult = Result<ExchangeRate, FetchError>;

type PendingRate = Shared<BoxFuture<'static, RateResult>>;

struct Inner {
  client: PartsClient,
  store: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
  period: Duration,
  probe_query: String,
  state: Mutex<ExchangeRateState>,
  /// At most one lookup in flight, tagged so a superseded lookup cannot
  /// clear its replacement's slot
  pending: Mutex<Option<(u64, PendingRate)>>,
  next_lookup: AtomicU64,
}

/// Cached, single-flight USD -> page currency multiplier.
#[derive(Clone)]
pub struct ExchangeRateResolver {
  inner: Arc<Inner>,
}

impl ExchangeRateResolver {
  pub fn new(
    client: PartsClient,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    period: Duration,
    probe_query: impl Into<String>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        client,
        store,
        clock,
        period,
        probe_query: probe_query.into(),
        state: Mutex::new(ExchangeRateState::default()),
        pending: Mutex::new(None),
        next_lookup: AtomicU64::new(0),
      }),
    }
  }

  /// Resolver with the default period and probe query.
  pub fn with_defaults(
    client: PartsClient,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self::new(
      client,
      store,
      clock,
      Duration::hours(DEFAULT_CACHE_PERIOD_HOURS),
      DEFAULT_PROBE_QUERY,
    )
  }

  fn state(&self) -> MutexGuard<'_, ExchangeRateState> {
    self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn pending(&self) -> MutexGuard<'_, Option<(u64, PendingRate)>> {
    self.inner.pending.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Hydrate from the store, discarding a rate older than the cache period.
  pub fn load(&self) -> color_eyre::Result<()> {
    let loaded: ExchangeRateState = match self.inner.store.read(EXCHANGE_RATE_NAME)? {
      Some(raw) => serde_json::from_value(raw).unwrap_or_else(|e| {
        warn!("Discarding unreadable exchange rate state: {}", e);
        ExchangeRateState::default()
      }),
      None => ExchangeRateState::default(),
    };

    let now = self.inner.clock.now();
    let loaded = if loaded.rate.is_some() && loaded.fresh_rate(now, self.inner.period).is_none() {
      info!("Evicting expired exchange rate");
      ExchangeRateState::default()
    } else {
      loaded
    };

    *self.state() = loaded;
    Ok(())
  }

  /// Snapshot of the current state.
  pub fn snapshot(&self) -> ExchangeRateState {
    self.state().clone()
  }

  pub fn currency(&self) -> Option<String> {
    self.state().currency_code.clone()
  }

  /// Adopt the page currency. A change discards the cached rate and releases
  /// any lookup in flight so the next request issues a fresh one.
  pub fn set_currency(&self, code: &str) {
    let snapshot = {
      let mut state = self.state();
      if state.currency_code.as_deref() == Some(code) {
        return;
      }
      info!(
        "Currency changed from {} to {}",
        state.currency_code.as_deref().unwrap_or("none"),
        code
      );
      *state = ExchangeRateState {
        currency_code: Some(code.to_string()),
        ..ExchangeRateState::default()
      };
      state.clone()
    };

    self.pending().take();
    self.persist(&snapshot);
  }

  /// The cached rate, if it is still fresh. A stale rate is cleared.
  pub fn cached(&self) -> Option<ExchangeRate> {
    if self.is_usd() {
      return Some(ExchangeRate::usd());
    }

    let now = self.inner.clock.now();
    let mut state = self.state();
    let fresh = state.fresh_rate(now, self.inner.period);
    if fresh.is_none() && state.rate.is_some() {
      debug!("Exchange rate expired");
      state.clear_rate();
    }
    fresh
  }

  fn is_usd(&self) -> bool {
    self
      .state()
      .currency_code
      .as_deref()
      .is_some_and(|c| c.eq_ignore_ascii_case("USD"))
  }

  pub async fn get_rate(&self) -> Result<f64, FetchError> {
    self.resolve().await.map(|r| r.rate)
  }

  pub async fn get_symbol(&self) -> Result<String, FetchError> {
    self.resolve().await.map(|r| r.symbol)
  }

  /// Cached rate, or the result of the (single) lookup in flight.
  pub async fn resolve(&self) -> RateResult {
    if let Some(rate) = self.cached() {
      return Ok(rate);
    }

    let lookup = {
      let mut pending = self.pending();
      match pending.as_ref() {
        Some((_, lookup)) => lookup.clone(),
        None => {
          let id = self.inner.next_lookup.fetch_add(1, Ordering::Relaxed);
          let lookup = self.start_lookup(id);
          *pending = Some((id, lookup.clone()));
          lookup
        }
      }
    };

    lookup.await
  }

  fn start_lookup(&self, id: u64) -> PendingRate {
    let resolver = self.clone();
    let currency = self.currency();
    let query = self.inner.probe_query.clone();
    debug!("Looking up exchange rate for {}", currency.as_deref().unwrap_or("page currency"));

    let task = tokio::spawn(async move {
      let _guard = RateSlotGuard {
        resolver: resolver.clone(),
        id,
      };
      let result = match resolver.inner.client.search(&query).await {
        Ok(response) => parse_exchange_rate(&query, &response.body),
        Err(e) => Err(FetchError::Transport {
          key: query.clone(),
          message: e.to_string(),
        }),
      };

      match &result {
        Ok(rate) => resolver.store_rate(currency.as_deref(), rate),
        Err(e) => warn!("Failed to look up exchange rate: {}", e),
      }
      result
    });

    let query = self.inner.probe_query.clone();
    async move {
      match task.await {
        Ok(result) => result,
        Err(e) => Err(FetchError::Task {
          key: query,
          message: e.to_string(),
        }),
      }
    }
    .boxed()
    .shared()
  }

  /// Record a looked-up rate, unless the currency changed while it was in flight.
  fn store_rate(&self, currency: Option<&str>, rate: &ExchangeRate) {
    let snapshot = {
      let mut state = self.state();
      if state.currency_code.as_deref() != currency {
        debug!("Discarding exchange rate looked up for a previous currency");
        return;
      }
      state.rate = Some(rate.rate);
      state.currency_symbol = rate.symbol.clone();
      state.stored_at = Some(self.inner.clock.now());
      state.clone()
    };
    info!("Exchange rate is {} ({})", rate.rate, rate.symbol);
    self.persist(&snapshot);
  }

  fn persist(&self, state: &ExchangeRateState) {
    let result = serde_json::to_value(state)
      .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize exchange rate: {}", e))
      .and_then(|value| self.inner.store.write(EXCHANGE_RATE_NAME, &value));
    if let Err(e) = result {
      warn!("Failed to persist exchange rate: {}", e);
    }
  }
}

struct RateSlotGuard {
  resolver: ExchangeRateResolver,
  id: u64,
}

impl Drop for RateSlotGuard {
  fn drop(&mut self) {
    let mut pending = self.resolver.pending();
    if matches!(pending.as_ref(), Some((id, _)) if *id == self.id) {
      pending.take();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::ManualClock;
  use crate::cache::MemoryStore;
  use crate::config::Config;
  use crate::parts::client::testing::FakeTransport;
  use chrono::TimeZone;
  use serde_json::json;

  struct Harness {
    transport: Arc<FakeTransport>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    resolver: ExchangeRateResolver,
  }

  fn harness(transport: FakeTransport) -> Harness {
    let transport = Arc::new(transport);
    let clock = Arc::new(ManualClock::new(
      Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    ));
    let store = Arc::new(MemoryStore::new());
    let client = PartsClient::new(&Config::default(), transport.clone());
    let resolver = ExchangeRateResolver::with_defaults(client, store.clone(), clock.clone());
    Harness {
      transport,
      clock,
      store,
      resolver,
    }
  }

  fn listing(usd: f64, local: f64, symbol: &str) -> serde_json::Value {
    json!({ "code": 200, "result": { "data": [
      { "number": "C25804", "stock_number": 5000, "currency_symbol": symbol,
        "prices": [{ "ladder": 100, "usd_price": usd, "local_price": local }] }
    ]}})
  }

  #[tokio::test]
  async fn test_rate_is_local_over_usd() {
    let h = harness(FakeTransport::new());
    h.transport.respond("search_content", 200, listing(0.01, 0.0092, "€"));
    h.resolver.set_currency("EUR");

    let rate = h.resolver.get_rate().await.unwrap();
    assert!((rate - 0.92).abs() < 1e-9);
    assert_eq!(h.resolver.get_symbol().await.unwrap(), "€");
    assert_eq!(h.transport.calls(), 1);

    let persisted = h.store.read(EXCHANGE_RATE_NAME).unwrap().unwrap();
    assert_eq!(persisted["currency_code"], "EUR");
  }

  #[tokio::test]
  async fn test_concurrent_lookups_share_one_call() {
    let h = harness(FakeTransport::gated());
    h.transport.respond("search_content", 200, listing(1.0, 7.1, "¥"));
    h.resolver.set_currency("CNY");

    let waiters: Vec<_> = (0..3)
      .map(|_| {
        let resolver = h.resolver.clone();
        tokio::spawn(async move { resolver.resolve().await })
      })
      .collect();
    for _ in 0..5 {
      tokio::task::yield_now().await;
    }
    h.transport.release();

    for waiter in waiters {
      let rate = waiter.await.unwrap().unwrap();
      assert_eq!(rate.symbol, "¥");
    }
    assert_eq!(h.transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_currency_change_clears_state_and_refetches_once() {
    let h = harness(FakeTransport::new());
    h.transport.respond("search_content", 200, listing(1.0, 0.9, "€"));
    h.resolver.set_currency("EUR");
    h.resolver.get_rate().await.unwrap();

    h.resolver.set_currency("GBP");
    let state = h.resolver.snapshot();
    assert_eq!(state.rate, None);
    assert_eq!(state.currency_symbol, "");
    assert_eq!(state.stored_at, None);
    assert_eq!(state.currency_code.as_deref(), Some("GBP"));

    h.transport.respond("search_content", 200, listing(1.0, 0.8, "£"));
    let (a, b) = tokio::join!(h.resolver.get_rate(), h.resolver.get_rate());
    assert_eq!(a, b);
    assert_eq!(h.transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_same_currency_keeps_rate() {
    let h = harness(FakeTransport::new());
    h.transport.respond("search_content", 200, listing(1.0, 0.9, "€"));
    h.resolver.set_currency("EUR");
    h.resolver.get_rate().await.unwrap();

    h.resolver.set_currency("EUR");
    h.resolver.get_rate().await.unwrap();
    assert_eq!(h.transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_rate_expires_after_period() {
    let h = harness(FakeTransport::new());
    h.transport.respond("search_content", 200, listing(1.0, 0.9, "€"));
    h.resolver.set_currency("EUR");
    h.resolver.get_rate().await.unwrap();

    h.clock.advance(Duration::hours(25));
    assert_eq!(h.resolver.cached(), None);
    h.resolver.get_rate().await.unwrap();
    assert_eq!(h.transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_usd_needs_no_lookup() {
    let h = harness(FakeTransport::new());
    h.resolver.set_currency("USD");
    assert_eq!(h.resolver.resolve().await.unwrap(), ExchangeRate::usd());
    assert_eq!(h.transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_failed_lookup_is_retried() {
    let h = harness(FakeTransport::new());
    h.transport.fail("search_content", "timed out");
    h.resolver.set_currency("EUR");
    assert!(h.resolver.get_rate().await.is_err());

    h.transport.respond("search_content", 200, listing(1.0, 0.9, "€"));
    assert!(h.resolver.get_rate().await.is_ok());
    assert_eq!(h.transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_load_restores_fresh_rate() {
    let h = harness(FakeTransport::new());
    h.transport.respond("search_content", 200, listing(1.0, 0.9, "€"));
    h.resolver.set_currency("EUR");
    h.resolver.get_rate().await.unwrap();

    let client = PartsClient::new(&Config::default(), h.transport.clone());
    let reloaded = ExchangeRateResolver::with_defaults(client, h.store.clone(), h.clock.clone());
    reloaded.load().unwrap();
    assert_eq!(reloaded.cached().map(|r| r.symbol), Some("€".to_string()));

    h.clock.advance(Duration::hours(30));
    reloaded.load().unwrap();
    assert_eq!(reloaded.snapshot(), ExchangeRateState::default());
  }
}
