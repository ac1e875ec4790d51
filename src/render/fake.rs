//! In-memory page used to drive the renderer in tests.

use std::collections::HashMap;

use super::page::{CellContent, Column, HeaderElement, HeaderLocation, NodeId, Page};

pub const MFR_HEADER_ID: &str = "mfr_header";
pub const MFR_FLOATING_HEADER_ID: &str = "mfr_floating_header";

#[derive(Debug, Clone)]
struct Node {
  dom_id: Option<String>,
  column: Option<Column>,
  attached: bool,
  width: f64,
  min_width: Option<f64>,
  content: Option<CellContent>,
}

impl Node {
  fn new(dom_id: Option<&str>, column: Option<Column>, width: f64) -> Self {
    Self {
      dom_id: dom_id.map(String::from),
      column,
      attached: true,
      width,
      min_width: None,
      content: None,
    }
  }
}

#[derive(Debug, Clone)]
struct Row {
  node: NodeId,
  part: Option<String>,
  /// Cells in display order; the reference cell is among them
  cells: Vec<NodeId>,
  reference: Option<NodeId>,
}

pub struct FakePage {
  next_id: u64,
  nodes: HashMap<NodeId, Node>,
  table_present: bool,
  headers: HashMap<HeaderLocation, Vec<NodeId>>,
  rows: Vec<Row>,
  currency: Option<String>,
  /// Number of insert calls, headers and cells together
  pub inserts: usize,
  /// Content writes that landed on detached nodes
  pub writes_to_detached: usize,
}

impl FakePage {
  /// A page with the product table and its reference headers, but no rows.
  pub fn new() -> Self {
    let mut page = Self {
      next_id: 1,
      nodes: HashMap::new(),
      table_present: true,
      headers: HashMap::new(),
      rows: Vec::new(),
      currency: None,
      inserts: 0,
      writes_to_detached: 0,
    };
    let fixed = page.add_node(Node::new(Some(MFR_HEADER_ID), None, 120.0));
    let floating = page.add_node(Node::new(Some(MFR_FLOATING_HEADER_ID), None, 120.0));
    page.headers.insert(HeaderLocation::Fixed, vec![fixed]);
    page.headers.insert(HeaderLocation::Floating, vec![floating]);
    page
  }

  /// A page whose product table has not been rendered yet.
  pub fn without_table() -> Self {
    let mut page = Self::new();
    page.table_present = false;
    page
  }

  pub fn with_currency(mut self, code: &str) -> Self {
    self.currency = Some(code.to_string());
    self
  }

  fn add_node(&mut self, node: Node) -> NodeId {
    let id = NodeId(self.next_id);
    self.next_id += 1;
    self.nodes.insert(id, node);
    id
  }

  pub fn set_table_present(&mut self, present: bool) {
    self.table_present = present;
  }

  /// Append rows for the given part numbers.
  pub fn append_rows(&mut self, parts: &[&str]) {
    for part in parts {
      let node = self.add_node(Node::new(None, None, 0.0));
      let reference = self.add_node(Node::new(None, None, 100.0));
      self.rows.push(Row {
        node,
        part: Some(part.to_string()),
        cells: vec![reference],
        reference: Some(reference),
      });
    }
  }

  /// Append a row lacking the reference cell.
  pub fn append_broken_row(&mut self) {
    let node = self.add_node(Node::new(None, None, 0.0));
    self.rows.push(Row {
      node,
      part: None,
      cells: Vec::new(),
      reference: None,
    });
  }

  /// Remove every row along with its cells, as a page change does.
  pub fn clear_rows(&mut self) {
    for row in std::mem::take(&mut self.rows) {
      for cell in row.cells {
        self.detach(cell);
      }
      self.detach(row.node);
    }
  }

  /// Replace the table as the host does on navigation: injected headers and
  /// all rows are detached, the reference headers survive.
  pub fn rebuild_table(&mut self) {
    self.clear_rows();
    let injected: Vec<NodeId> = self
      .headers
      .values()
      .flatten()
      .copied()
      .filter(|id| self.nodes[id].column.is_some())
      .collect();
    for node in injected {
      self.remove(node);
    }
    self.table_present = true;
  }

  pub fn drop_reference_header(&mut self, location: HeaderLocation) {
    let id = match location {
      HeaderLocation::Fixed => MFR_HEADER_ID,
      HeaderLocation::Floating => MFR_FLOATING_HEADER_ID,
    };
    if let Some(node) = self.element_by_id(id) {
      self.remove(node);
    }
  }

  fn detach(&mut self, node: NodeId) {
    if let Some(n) = self.nodes.get_mut(&node) {
      n.attached = false;
    }
  }

  pub fn is_attached(&self, node: NodeId) -> bool {
    self.nodes.get(&node).is_some_and(|n| n.attached)
  }

  /// Ids of the headers in `location`, in display order.
  pub fn header_ids(&self, location: HeaderLocation) -> Vec<String> {
    self.headers[&location]
      .iter()
      .filter_map(|id| self.nodes[id].dom_id.clone())
      .collect()
  }

  /// Content of the `column` cell in the row showing `part`.
  pub fn content(&self, part: &str, column: Column) -> Option<CellContent> {
    let row = self.rows.iter().find(|r| r.part.as_deref() == Some(part))?;
    row
      .cells
      .iter()
      .map(|id| &self.nodes[id])
      .find(|n| n.column == Some(column))
      .and_then(|n| n.content.clone())
  }

  pub fn content_of(&self, node: NodeId) -> Option<CellContent> {
    self.nodes.get(&node).and_then(|n| n.content.clone())
  }

  pub fn min_width_of(&self, dom_id: &str) -> Option<f64> {
    let node = self.element_by_id(dom_id)?;
    self.nodes[&node].min_width
  }

  /// Number of attached data cells in a row.
  pub fn cell_count(&self, part: &str) -> usize {
    self
      .rows
      .iter()
      .find(|r| r.part.as_deref() == Some(part))
      .map_or(0, |r| r.cells.len())
  }
}

/// Rendered width of a cell with the given content.
fn content_width(content: &CellContent) -> f64 {
  match content {
    CellContent::Loading => 30.0,
    CellContent::Unavailable => 40.0,
    CellContent::Stock { count, .. } => 20.0 + 8.0 * count.to_string().len() as f64,
    CellContent::Prices { lines, .. } => {
      let widest = lines.iter().map(|l| l.unit_price.len()).max().unwrap_or(0);
      60.0 + 8.0 * widest as f64
    }
  }
}

impl Page for FakePage {
  fn is_table_present(&self) -> bool {
    self.table_present
  }

  fn element_by_id(&self, id: &str) -> Option<NodeId> {
    self
      .nodes
      .iter()
      .find(|(_, n)| n.attached && n.dom_id.as_deref() == Some(id))
      .map(|(node, _)| *node)
  }

  fn reference_header(&self, location: HeaderLocation) -> Option<NodeId> {
    let id = match location {
      HeaderLocation::Fixed => MFR_HEADER_ID,
      HeaderLocation::Floating => MFR_FLOATING_HEADER_ID,
    };
    self.element_by_id(id)
  }

  fn insert_header(&mut self, reference: NodeId, header: &HeaderElement) -> NodeId {
    self.inserts += 1;
    let node = self.add_node(Node::new(Some(header.id), Some(header.column), 50.0));
    let row = self.headers.entry(header.location).or_default();
    let position = row.iter().position(|n| *n == reference).unwrap_or(row.len());
    row.insert(position, node);
    node
  }

  fn rows(&self) -> Vec<NodeId> {
    self.rows.iter().map(|r| r.node).collect()
  }

  fn reference_cell(&self, row: NodeId) -> Option<NodeId> {
    self.rows.iter().find(|r| r.node == row)?.reference
  }

  fn insert_cell(&mut self, reference: NodeId, column: Column) -> NodeId {
    self.inserts += 1;
    let node = self.add_node(Node::new(None, Some(column), 0.0));
    if let Some(row) = self.rows.iter_mut().find(|r| r.cells.contains(&reference)) {
      let position = row.cells.iter().position(|n| *n == reference).unwrap_or(0);
      row.cells.insert(position, node);
    }
    node
  }

  fn part_number(&self, row: NodeId) -> Option<String> {
    self.rows.iter().find(|r| r.node == row)?.part.clone()
  }

  fn set_content(&mut self, cell: NodeId, content: &CellContent) {
    if let Some(node) = self.nodes.get_mut(&cell) {
      if !node.attached {
        self.writes_to_detached += 1;
      }
      node.width = content_width(content);
      node.content = Some(content.clone());
    }
  }

  fn cells(&self, column: Column) -> Vec<NodeId> {
    self
      .rows
      .iter()
      .flat_map(|r| r.cells.iter())
      .filter(|id| {
        let n = &self.nodes[*id];
        n.attached && n.column == Some(column)
      })
      .copied()
      .collect()
  }

  fn width(&self, node: NodeId) -> f64 {
    self.nodes.get(&node).map_or(0.0, |n| n.width)
  }

  fn set_min_width(&mut self, node: NodeId, width: f64) {
    if let Some(n) = self.nodes.get_mut(&node) {
      n.min_width = Some(width);
    }
  }

  fn remove(&mut self, node: NodeId) {
    self.detach(node);
    for row in &mut self.rows {
      row.cells.retain(|n| *n != node);
    }
    for row in self.headers.values_mut() {
      row.retain(|n| *n != node);
    }
  }

  fn currency_code(&self) -> Option<String> {
    self.currency.clone()
  }
}
