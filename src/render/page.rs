//! Narrow accessor interface onto the host page.
//!
//! The render driver never touches markup directly. Selectors, templating and
//! styling belong to the `Page` implementation; the driver only asks
//! structural questions and hands over typed content.

use std::fmt;

/// Opaque handle to a page element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// An augmented column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
  Stock,
  Price,
}

impl Column {
  pub const ALL: [Column; 2] = [Column::Stock, Column::Price];

  pub fn header_text(self) -> &'static str {
    match self {
      Column::Stock => "JLCPCB Stock",
      Column::Price => "JLCPCB Price",
    }
  }

  /// Reserved element id of the header in the given location.
  pub fn header_id(self, location: HeaderLocation) -> &'static str {
    match (self, location) {
      (Column::Stock, HeaderLocation::Fixed) => "jlcpcb_stock_header_cell",
      (Column::Stock, HeaderLocation::Floating) => "jlcpcb_floating_stock_header_cell",
      (Column::Price, HeaderLocation::Fixed) => "jlcpcb_price_header_cell",
      (Column::Price, HeaderLocation::Floating) => "jlcpcb_floating_price_header_cell",
    }
  }
}

/// The table has a primary header row and a floating copy pinned during scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderLocation {
  Fixed,
  Floating,
}

impl HeaderLocation {
  pub const ALL: [HeaderLocation; 2] = [HeaderLocation::Fixed, HeaderLocation::Floating];
}

/// A header element to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderElement {
  pub id: &'static str,
  pub column: Column,
  pub location: HeaderLocation,
  pub text: &'static str,
}

impl HeaderElement {
  pub fn new(column: Column, location: HeaderLocation) -> Self {
    Self {
      id: column.header_id(location),
      column,
      location,
      text: column.header_text(),
    }
  }
}

/// One row of a price list, already converted into the display currency.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLine {
  pub quantity: u64,
  pub unit_price: String,
}

/// Minimum order note shown under the price list.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimumOrder {
  pub quantity: u64,
  pub price: Option<String>,
  pub loss: Option<u64>,
}

/// What a data cell should show.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
  /// Placeholder while the lookup is outstanding
  Loading,
  Stock {
    count: i64,
    in_stock: bool,
  },
  Prices {
    symbol: String,
    lines: Vec<PriceLine>,
    minimum: Option<MinimumOrder>,
  },
  /// Not found, or the lookup failed
  Unavailable,
}

/// Structural accessors onto the host page.
pub trait Page: Send + 'static {
  /// Whether the product table container and body are both attached.
  fn is_table_present(&self) -> bool;

  /// Look up an attached element by id.
  fn element_by_id(&self, id: &str) -> Option<NodeId>;

  /// The existing header the augmented headers are inserted before.
  fn reference_header(&self, location: HeaderLocation) -> Option<NodeId>;

  /// Insert `header` immediately before `reference`.
  fn insert_header(&mut self, reference: NodeId, header: &HeaderElement) -> NodeId;

  /// Current data rows, in order.
  fn rows(&self) -> Vec<NodeId>;

  /// The existing cell in `row` the augmented cells are inserted before.
  fn reference_cell(&self, row: NodeId) -> Option<NodeId>;

  /// Insert an empty data cell for `column` immediately before `reference`.
  fn insert_cell(&mut self, reference: NodeId, column: Column) -> NodeId;

  /// The part identifier shown in `row`.
  fn part_number(&self, row: NodeId) -> Option<String>;

  fn set_content(&mut self, cell: NodeId, content: &CellContent);

  /// Attached data cells of `column`.
  fn cells(&self, column: Column) -> Vec<NodeId>;

  /// Rendered width of `node` in pixels.
  fn width(&self, node: NodeId) -> f64;

  fn set_min_width(&mut self, node: NodeId, width: f64);

  /// Detach `node`. Detaching an already detached node is a no-op.
  fn remove(&mut self, node: NodeId);

  /// Currency code the page is displaying prices in.
  fn currency_code(&self) -> Option<String>;
}
