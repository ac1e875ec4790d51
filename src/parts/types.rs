use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single quantity break in a part's price list (prices in USD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTier {
  pub start_number: u64,
  #[serde(default)]
  pub end_number: Option<i64>,
  pub product_price: f64,
}

/// Part data returned by the search-by-code API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartDetail {
  pub component_code: String,
  #[serde(default)]
  pub stock_count: i64,
  #[serde(default)]
  pub prices: Option<Vec<PriceTier>>,
  #[serde(default)]
  pub jlc_prices: Option<Vec<PriceTier>>,
  /// Minimum order quantity, when the part has one
  #[serde(default)]
  pub least_number: Option<u64>,
  #[serde(default)]
  pub least_number_price: Option<f64>,
  /// Attrition count added to each order
  #[serde(default)]
  pub loss_number: Option<u64>,
}

impl PartDetail {
  pub fn in_stock(&self) -> bool {
    self.stock_count > 0
  }

  /// Price tiers sorted by quantity, preferring `prices` over `jlc_prices`.
  pub fn price_tiers(&self) -> Option<Vec<PriceTier>> {
    let tiers = match (&self.prices, &self.jlc_prices) {
      (Some(p), _) if !p.is_empty() => p,
      (_, Some(p)) if !p.is_empty() => p,
      _ => return None,
    };
    let mut tiers = tiers.clone();
    tiers.sort_by_key(|t| t.start_number);
    Some(tiers)
  }
}

/// Currency conversion multiplier from USD into the page currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRate {
  pub rate: f64,
  pub symbol: String,
}

impl ExchangeRate {
  pub fn usd() -> Self {
    Self {
      rate: 1.0,
      symbol: "$".to_string(),
    }
  }
}

/// A part's listing on the search-by-query API, reduced to what is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LcscPart {
  pub number: String,
  /// Attribute name -> value, as listed by LCSC
  #[serde(default)]
  pub attributes: BTreeMap<String, Value>,
}

impl LcscPart {
  /// Attributes as display text. String values are shown without quotes.
  pub fn attribute_lines(&self) -> Vec<(String, String)> {
    self
      .attributes
      .iter()
      .map(|(name, value)| {
        let text = match value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        (name.clone(), text)
      })
      .collect()
  }
}
