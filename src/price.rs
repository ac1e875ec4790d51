//! Price conversion with upward rounding.
//!
//! Converted prices are rounded up (ceiling) so a displayed foreign-currency
//! price is never below the true cost. The precision follows the original
//! value's decimal places, clamped to [`MIN_PRECISION`, `MAX_PRECISION`].

pub const MIN_PRECISION: u32 = 3;
pub const MAX_PRECISION: u32 = 5;

/// Scaled products within this many ulps of a whole step are treated as
/// exact, so binary float noise (87.33 stored as 87.33000000000001) does not
/// push the ceiling up a whole step. Real excesses above a step are far larger.
const SNAP_ULPS: f64 = 4.0;

/// Number of digits after the decimal point in the shortest representation
/// of `value`.
pub fn decimal_places(value: f64) -> u32 {
  if !value.is_finite() {
    return 0;
  }
  let repr = value.abs().to_string();
  match repr.split_once('.') {
    Some((_, fraction)) => fraction.len() as u32,
    None => 0,
  }
}

/// Round `value` up to `places` decimal places.
pub fn round_up(value: f64, places: u32) -> f64 {
  let factor = 10f64.powi(places as i32);
  let scaled = value * factor;
  let snapped = scaled.round();
  let tolerance = scaled.abs() * SNAP_ULPS * f64::EPSILON;
  let scaled = if (scaled - snapped).abs() <= tolerance {
    snapped
  } else {
    scaled
  };
  scaled.ceil() / factor
}

/// Convert a USD price into the page currency using `rate`.
pub fn convert_price(value: f64, rate: f64) -> f64 {
  let places = decimal_places(value).clamp(MIN_PRECISION, MAX_PRECISION);
  round_up(value * rate, places)
}

/// Format a converted price using the precision `convert_price` rounded to.
pub fn format_price(original: f64, converted: f64) -> String {
  let places = decimal_places(original).clamp(MIN_PRECISION, MAX_PRECISION) as usize;
  format!("{:.*}", places, converted)
}
