//! Remote part data: API types, HTTP client, and the cached single-flight
//! lookups built on them.

pub mod api_types;
pub mod attributes;
pub mod client;
pub mod exchange;
pub mod fetcher;
pub mod types;

pub use attributes::{AttributeFetcher, AttributeLookup, ATTRIBUTE_CACHE_NAME};
pub use client::{HttpRequest, HttpResponse, Method, PartsClient, ReqwestTransport, Transport};
pub use exchange::{ExchangeRateResolver, ExchangeRateState, DEFAULT_PROBE_QUERY};
pub use fetcher::{
  CachedFetcher, FetchError, Lookup, LookupResult, PartFetcher, PartLookup, PartResult, PART_CACHE_NAME,
};
pub use types::{ExchangeRate, LcscPart, PartDetail, PriceTier};
