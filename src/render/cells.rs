//! Cell content for the augmented columns.

use tracing::warn;

use crate::parts::{ExchangeRate, PartDetail, PartResult};
use crate::price::{convert_price, format_price};

use super::page::{CellContent, MinimumOrder, PriceLine};

/// Price lines shown per part.
pub const MAX_PRICE_LINES: usize = 5;

pub fn stock_content(result: &PartResult) -> CellContent {
  match result {
    Ok(Some(part)) => CellContent::Stock {
      count: part.stock_count,
      in_stock: part.in_stock(),
    },
    Ok(None) | Err(_) => CellContent::Unavailable,
  }
}

/// Price list for a part. Prices are converted with `rate` when given,
/// otherwise shown in USD.
pub fn price_content(result: &PartResult, rate: Option<&ExchangeRate>) -> CellContent {
  match result {
    Ok(Some(part)) => price_lines(part, rate),
    Ok(None) | Err(_) => CellContent::Unavailable,
  }
}

fn price_lines(part: &PartDetail, rate: Option<&ExchangeRate>) -> CellContent {
  let Some(tiers) = part.price_tiers() else {
    warn!("Invalid price data for part {}", part.component_code);
    return CellContent::Unavailable;
  };

  let minimum = part.least_number.map(|quantity| MinimumOrder {
    quantity,
    price: part.least_number_price.map(|p| display_price(p, rate)),
    loss: part.loss_number,
  });
  // One line gives way to the minimum order note
  let max_lines = if minimum.is_some() {
    MAX_PRICE_LINES - 1
  } else {
    MAX_PRICE_LINES
  };

  let lines = tiers
    .iter()
    .take(max_lines)
    .map(|tier| PriceLine {
      quantity: tier.start_number,
      unit_price: display_price(tier.product_price, rate),
    })
    .collect();

  CellContent::Prices {
    symbol: rate.map_or_else(|| "$".to_string(), |r| r.symbol.clone()),
    lines,
    minimum,
  }
}

fn display_price(usd: f64, rate: Option<&ExchangeRate>) -> String {
  match rate {
    Some(rate) => format_price(usd, convert_price(usd, rate.rate)),
    None => usd.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parts::{FetchError, PriceTier};

  fn tier(start: u64, price: f64) -> PriceTier {
    PriceTier {
      start_number: start,
      end_number: None,
      product_price: price,
    }
  }

  fn part(stock: i64) -> PartDetail {
    PartDetail {
      component_code: "C1".to_string(),
      stock_count: stock,
      prices: None,
      jlc_prices: None,
      least_number: None,
      least_number_price: None,
      loss_number: None,
    }
  }

  #[test]
  fn test_stock_content() {
    assert_eq!(
      stock_content(&Ok(Some(part(12)))),
      CellContent::Stock {
        count: 12,
        in_stock: true
      }
    );
    assert_eq!(
      stock_content(&Ok(Some(part(0)))),
      CellContent::Stock {
        count: 0,
        in_stock: false
      }
    );
    assert_eq!(stock_content(&Ok(None)), CellContent::Unavailable);
    let err = FetchError::Transport {
      key: "C1".to_string(),
      message: "timeout".to_string(),
    };
    assert_eq!(stock_content(&Err(err)), CellContent::Unavailable);
  }

  #[test]
  fn test_prices_sorted_and_capped() {
    let mut p = part(10);
    p.prices = Some(
      [1000, 1, 500, 20, 100, 5]
        .iter()
        .map(|&n| tier(n, 0.01))
        .collect(),
    );

    let CellContent::Prices { lines, symbol, minimum } = price_content(&Ok(Some(p)), None) else {
      panic!("expected prices");
    };
    assert_eq!(symbol, "$");
    assert!(minimum.is_none());
    let quantities: Vec<u64> = lines.iter().map(|l| l.quantity).collect();
    assert_eq!(quantities, vec![1, 5, 20, 100, 500]);
  }

  #[test]
  fn test_minimum_order_takes_a_line() {
    let mut p = part(10);
    p.jlc_prices = Some((1..=6).map(|n| tier(n * 10, 0.5)).collect());
    p.least_number = Some(20);
    p.least_number_price = Some(10.0);
    p.loss_number = Some(3);

    let CellContent::Prices { lines, minimum, .. } = price_content(&Ok(Some(p)), None) else {
      panic!("expected prices");
    };
    assert_eq!(lines.len(), 4);
    assert_eq!(
      minimum,
      Some(MinimumOrder {
        quantity: 20,
        price: Some("10".to_string()),
        loss: Some(3),
      })
    );
  }

  #[test]
  fn test_prices_converted_with_rate() {
    let mut p = part(10);
    p.prices = Some(vec![tier(1, 12.3)]);
    let rate = ExchangeRate {
      rate: 7.1,
      symbol: "¥".to_string(),
    };

    let CellContent::Prices { lines, symbol, .. } = price_content(&Ok(Some(p)), Some(&rate)) else {
      panic!("expected prices");
    };
    assert_eq!(symbol, "¥");
    assert_eq!(lines[0].unit_price, "87.330");
  }

  #[test]
  fn test_missing_prices_unavailable() {
    assert_eq!(price_content(&Ok(Some(part(3))), None), CellContent::Unavailable);
  }
}
