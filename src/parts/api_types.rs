//! Serde-deserializable types matching the remote API responses.
//!
//! Both APIs wrap their payload in `{ code, data }` or `{ code, result: { data } }`.
//! These types only describe the envelope and the search listing; part records
//! deserialize straight into [`PartDetail`].

use serde::Deserialize;
use serde_json::Value;

use super::fetcher::FetchError;
use super::types::{ExchangeRate, LcscPart, PartDetail};

/// Response code the part API uses for an unknown component.
pub const CODE_NOT_FOUND: i64 = 500;
pub const CODE_OK: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  pub code: i64,
  #[serde(default)]
  pub data: Option<Value>,
  #[serde(default)]
  pub result: Option<ApiResult>,
}

#[derive(Debug, Deserialize)]
pub struct ApiResult {
  #[serde(default)]
  pub data: Option<Value>,
}

impl ApiEnvelope {
  /// The payload, from whichever of the two envelope shapes carried it.
  pub fn payload(&self) -> Option<&Value> {
    self
      .data
      .as_ref()
      .filter(|v| !v.is_null())
      .or_else(|| self.result.as_ref().and_then(|r| r.data.as_ref()))
  }
}

// ============================================================================
// Search-by-query listing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSearchPrice {
  #[serde(default)]
  pub ladder: u64,
  pub usd_price: f64,
  pub local_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchItem {
  #[serde(default)]
  pub number: String,
  #[serde(default)]
  pub stock_number: i64,
  #[serde(default)]
  pub currency_code: Option<String>,
  #[serde(default)]
  pub currency_symbol: Option<String>,
  #[serde(default)]
  pub prices: Vec<ApiSearchPrice>,
}

// ============================================================================
// Conversions
// ============================================================================

/// Outcome of a part lookup response. `Ok(None)` is a confirmed-absent part.
pub fn parse_part_response(
  requested: &str,
  status: u16,
  body: &Value,
) -> Result<Option<PartDetail>, FetchError> {
  let envelope: ApiEnvelope =
    serde_json::from_value(body.clone()).map_err(|e| FetchError::Malformed {
      key: requested.to_string(),
      reason: format!("unexpected envelope (HTTP {}): {}", status, e),
    })?;

  match envelope.code {
    CODE_NOT_FOUND => Ok(None),
    CODE_OK => {
      let payload = envelope.payload().ok_or_else(|| FetchError::Malformed {
        key: requested.to_string(),
        reason: "response carried no data".to_string(),
      })?;
      let part: PartDetail =
        serde_json::from_value(payload.clone()).map_err(|e| FetchError::Malformed {
          key: requested.to_string(),
          reason: format!("unreadable part record: {}", e),
        })?;

      if part.component_code != requested {
        return Err(FetchError::Mismatch {
          requested: requested.to_string(),
          received: part.component_code,
        });
      }
      Ok(Some(part))
    }
    other => Err(FetchError::Malformed {
      key: requested.to_string(),
      reason: format!("response code {}", other),
    }),
  }
}

/// Extract the conversion multiplier from a search listing.
///
/// Uses the first in-stock item that has a usable dual-currency price.
pub fn parse_exchange_rate(query: &str, body: &Value) -> Result<ExchangeRate, FetchError> {
  let malformed = |reason: String| FetchError::Malformed {
    key: query.to_string(),
    reason,
  };

  let envelope: ApiEnvelope = serde_json::from_value(body.clone())
    .map_err(|e| malformed(format!("unexpected envelope: {}", e)))?;
  if envelope.code != CODE_OK {
    return Err(malformed(format!("response code {}", envelope.code)));
  }

  let items: Vec<ApiSearchItem> = match envelope.payload() {
    Some(payload) => serde_json::from_value(payload.clone())
      .map_err(|e| malformed(format!("unreadable search listing: {}", e)))?,
    None => return Err(malformed("response carried no data".to_string())),
  };

  items
    .iter()
    .filter(|item| item.stock_number > 0)
    .find_map(|item| {
      let price = item.prices.iter().find(|p| p.usd_price > 0.0)?;
      Some(ExchangeRate {
        rate: price.local_price / price.usd_price,
        symbol: item.currency_symbol.clone().unwrap_or_default(),
      })
    })
    .ok_or_else(|| malformed("no in-stock item with a dual-currency price".to_string()))
}

/// The listing for `requested` from a search response.
///
/// Only the top result is considered; a search that ranks another part
/// first is a mismatch rather than a miss.
pub fn parse_attributes_response(requested: &str, body: &Value) -> Result<Option<LcscPart>, FetchError> {
  let malformed = |reason: String| FetchError::Malformed {
    key: requested.to_string(),
    reason,
  };

  let envelope: ApiEnvelope = serde_json::from_value(body.clone())
    .map_err(|e| malformed(format!("unexpected envelope: {}", e)))?;
  if envelope.code != CODE_OK {
    return Err(malformed(format!("response code {}", envelope.code)));
  }

  let items: Vec<LcscPart> = match envelope.payload() {
    Some(payload) => serde_json::from_value(payload.clone())
      .map_err(|e| malformed(format!("unreadable search listing: {}", e)))?,
    None => return Err(malformed("response carried no data".to_string())),
  };

  match items.into_iter().next() {
    Some(part) if part.number == requested => Ok(Some(part)),
    Some(part) => Err(FetchError::Mismatch {
      requested: requested.to_string(),
      received: part.number,
    }),
    None => Err(malformed("search returned no results".to_string())),
  }
}
