//! Part attributes from the search-by-query API.

use async_trait::async_trait;
use tracing::debug;

use super::api_types::parse_attributes_response;
use super::client::PartsClient;
use super::fetcher::{CachedFetcher, FetchError, Lookup, LookupResult};
use super::types::LcscPart;

/// Name the attribute cache is persisted under.
pub const ATTRIBUTE_CACHE_NAME: &str = "attributes.cache";

/// Cached, single-flight attribute lookups.
pub type AttributeFetcher = CachedFetcher<AttributeLookup>;

/// Searches LCSC for a part number and keeps the listing when it is the top hit.
pub struct AttributeLookup {
  client: PartsClient,
}

impl AttributeLookup {
  pub fn new(client: PartsClient) -> Self {
    Self { client }
  }
}

#[async_trait]
impl Lookup for AttributeLookup {
  type Value = LcscPart;
  const KIND: &'static str = "attributes of";

  async fn lookup(&self, key: &str) -> LookupResult<LcscPart> {
    let response = self
      .client
      .search(key)
      .await
      .map_err(|e| FetchError::Transport {
        key: key.to_string(),
        message: e.to_string(),
      })?;

    let part = parse_attributes_response(key, &response.body)?;
    debug!("Got part attributes for {}", key);
    Ok(part)
  }
}
