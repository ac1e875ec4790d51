//! The explicitly owned service object shared by the lookup binary and the
//! render driver.

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::cache::{Clock, KeyValueStore, SystemClock, TimedCache};
use crate::config::Config;
use crate::parts::{
  AttributeFetcher, AttributeLookup, ExchangeRateResolver, PartFetcher, PartLookup, PartsClient,
  Transport, ATTRIBUTE_CACHE_NAME, PART_CACHE_NAME,
};

/// Part, attribute and exchange-rate lookups over one store and transport.
#[derive(Clone)]
pub struct PartsService {
  parts: PartFetcher,
  attributes: AttributeFetcher,
  exchange: ExchangeRateResolver,
}

impl PartsService {
  pub fn new(config: &Config, store: Arc<dyn KeyValueStore>, transport: Arc<dyn Transport>) -> Self {
    Self::with_clock(config, store, transport, Arc::new(SystemClock))
  }

  pub fn with_clock(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    let client = PartsClient::new(config, transport);
    let period = config.cache.period();

    let cache = TimedCache::new(PART_CACHE_NAME, Arc::clone(&store), Arc::clone(&clock))
      .with_period(period);
    let parts = PartFetcher::new(PartLookup::new(client.clone()), Arc::new(cache));
    let cache = TimedCache::new(ATTRIBUTE_CACHE_NAME, Arc::clone(&store), Arc::clone(&clock))
      .with_period(period);
    let attributes = AttributeFetcher::new(AttributeLookup::new(client.clone()), Arc::new(cache));
    let exchange = ExchangeRateResolver::new(
      client,
      store,
      clock,
      period,
      config.exchange.probe_query.clone(),
    );

    Self {
      parts,
      attributes,
      exchange,
    }
  }

  pub fn parts(&self) -> &PartFetcher {
    &self.parts
  }

  pub fn attributes(&self) -> &AttributeFetcher {
    &self.attributes
  }

  pub fn exchange(&self) -> &ExchangeRateResolver {
    &self.exchange
  }

  /// Hydrate every cache from the store.
  pub fn load(&self) -> Result<()> {
    self.parts.cache().load_all()?;
    self.attributes.cache().load_all()?;
    self.exchange.load()?;
    Ok(())
  }

  /// Write the lookup caches that changed. The rate state is written as it changes.
  pub fn flush(&self) -> Result<bool> {
    let parts = self.parts.cache().flush_if_dirty()?;
    let attributes = self.attributes.cache().flush_if_dirty()?;
    Ok(parts || attributes)
  }

  /// Flush on a fixed timer until the returned task is aborted.
  pub fn spawn_flush_task(&self, every: Duration) -> JoinHandle<()> {
    let service = self.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(every);
      loop {
        interval.tick().await;
        if let Err(e) = service.flush() {
          warn!("Failed to save lookup caches: {}", e);
        }
      }
    })
  }
}
