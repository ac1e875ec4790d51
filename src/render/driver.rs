//! Mutation-driven render state machine.
//!
//! Each batch of mutation notifications moves the driver between
//! [`RenderState`]s:
//!
//! | From | Condition | Action | To |
//! |------|-----------|--------|----|
//! | any | table absent | none | `NoTable` |
//! | `NoTable` / `TableNoColumns` | headers missing | inject headers, cells, run handlers, resize | `TableWithColumns` |
//! | `TableWithColumns` | rows removed | discard cells, inject cells, run handlers, resize | `TableWithColumns` |
//!
//! A pass that cannot find an anchor element aborts without changing state
//! and is retried on the next batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::service::PartsService;

use super::cells::{price_content, stock_content};
use super::event::MutationBatch;
use super::page::{CellContent, Column, HeaderElement, HeaderLocation, NodeId, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
  /// The product table is not on the page
  NoTable,
  /// The table is present but the augmented columns are not
  TableNoColumns,
  /// Headers injected and cells rendered
  TableWithColumns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedKind {
  Header,
  Cell,
}

/// An element the driver injected and owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedElement {
  pub kind: TrackedKind,
  pub node: NodeId,
}

/// A data cell awaiting its lookup.
struct CellJob {
  column: Column,
  cell: NodeId,
  part: Option<String>,
}

pub struct RenderDriver<P: Page> {
  page: Arc<Mutex<P>>,
  service: PartsService,
  state: RenderState,
  tracked: Vec<TrackedElement>,
  /// Set when cell injection aborted, so the next batch retries it
  cells_pending: bool,
  /// Bumped whenever tracked cells are discarded or replaced; handlers from
  /// an older generation drop their results
  generation: Arc<AtomicU64>,
  handlers: JoinSet<()>,
}

fn lock<P>(page: &Mutex<P>) -> MutexGuard<'_, P> {
  page.lock().unwrap_or_else(|e| e.into_inner())
}

impl<P: Page> RenderDriver<P> {
  pub fn new(page: Arc<Mutex<P>>, service: PartsService) -> Self {
    Self {
      page,
      service,
      state: RenderState::NoTable,
      tracked: Vec::new(),
      cells_pending: false,
      generation: Arc::new(AtomicU64::new(0)),
      handlers: JoinSet::new(),
    }
  }

  pub fn state(&self) -> RenderState {
    self.state
  }

  pub fn tracked(&self) -> &[TrackedElement] {
    &self.tracked
  }

  /// Current render generation.
  pub fn generation(&self) -> u64 {
    self.generation.load(Ordering::SeqCst)
  }

  /// Process one batch of mutation notifications.
  pub fn handle(&mut self, batch: &MutationBatch) -> RenderState {
    let page = Arc::clone(&self.page);
    let mut page = lock(&page);

    if !page.is_table_present() {
      self.state = RenderState::NoTable;
      return self.state;
    }

    if let Some(code) = page.currency_code() {
      self.service.exchange().set_currency(&code);
    }

    if !all_headers_present(&*page) {
      self.state = RenderState::TableNoColumns;
      if !self.init_columns(&mut *page) {
        return self.state;
      }
      // Cells left over from a previous table are superseded
      self.discard_cells(&mut *page);
      if self.render_cells(&mut *page) {
        self.state = RenderState::TableWithColumns;
      }
    } else if batch.removes_rows() || self.cells_pending {
      debug!("Rows removed, re-rendering cells");
      self.discard_cells(&mut *page);
      if self.render_cells(&mut *page) {
        self.state = RenderState::TableWithColumns;
      }
    } else {
      self.state = RenderState::TableWithColumns;
    }

    self.state
  }

  /// Insert any missing headers at both header locations.
  fn init_columns(&mut self, page: &mut P) -> bool {
    self.forget_detached_headers(page);

    let (Some(fixed), Some(floating)) = (
      page.reference_header(HeaderLocation::Fixed),
      page.reference_header(HeaderLocation::Floating),
    ) else {
      debug!("Could not find the reference column headers");
      return false;
    };

    for column in Column::ALL {
      for (location, reference) in [
        (HeaderLocation::Fixed, fixed),
        (HeaderLocation::Floating, floating),
      ] {
        let header = HeaderElement::new(column, location);
        if page.element_by_id(header.id).is_some() {
          continue;
        }
        let node = page.insert_header(reference, &header);
        self.track(TrackedKind::Header, node);
      }
    }
    true
  }

  /// Stop tracking headers the page dropped, e.g. when it rebuilt the table.
  fn forget_detached_headers(&mut self, page: &P) {
    let attached: Vec<NodeId> = Column::ALL
      .iter()
      .flat_map(|column| HeaderLocation::ALL.map(|location| column.header_id(location)))
      .filter_map(|id| page.element_by_id(id))
      .collect();
    self
      .tracked
      .retain(|el| el.kind != TrackedKind::Header || attached.contains(&el.node));
  }

  /// Detach every tracked data cell. Headers are kept.
  fn discard_cells(&mut self, page: &mut P) {
    self.generation.fetch_add(1, Ordering::SeqCst);
    self.tracked.retain(|el| {
      if el.kind == TrackedKind::Cell {
        page.remove(el.node);
        false
      } else {
        true
      }
    });
  }

  /// Insert one cell per row and column, then start their handlers.
  fn render_cells(&mut self, page: &mut P) -> bool {
    let mut anchors = Vec::new();
    for row in page.rows() {
      match page.reference_cell(row) {
        Some(anchor) => anchors.push((row, anchor)),
        None => {
          debug!("Could not find the reference cell in row {}", row);
          self.cells_pending = true;
          return false;
        }
      }
    }

    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let mut jobs = Vec::with_capacity(anchors.len() * Column::ALL.len());
    for column in Column::ALL {
      for &(row, anchor) in &anchors {
        let cell = page.insert_cell(anchor, column);
        page.set_content(cell, &CellContent::Loading);
        self.track(TrackedKind::Cell, cell);
        jobs.push(CellJob {
          column,
          cell,
          part: page.part_number(row),
        });
      }
    }
    self.cells_pending = false;

    for job in jobs {
      self.spawn_handler(job, generation);
    }
    resize_columns(page);
    true
  }

  fn track(&mut self, kind: TrackedKind, node: NodeId) {
    self.tracked.push(TrackedElement { kind, node });
  }

  fn spawn_handler(&mut self, job: CellJob, generation: u64) {
    let page = Arc::clone(&self.page);
    let service = self.service.clone();
    let current = Arc::clone(&self.generation);

    self.handlers.spawn(async move {
      let content = match &job.part {
        Some(part) => resolve_content(&service, job.column, part).await,
        None => CellContent::Unavailable,
      };

      // Generations only advance with the page locked, so checking under the
      // lock keeps a discard from landing between the check and the write.
      let mut page = lock(&page);
      if current.load(Ordering::SeqCst) != generation {
        debug!("Dropping result for superseded cell {}", job.cell);
        return;
      }
      page.set_content(job.cell, &content);
      resize_columns(&mut *page);
    });
  }

  /// Wait for every outstanding cell handler.
  pub async fn settle(&mut self) {
    while let Some(result) = self.handlers.join_next().await {
      if let Err(e) = result {
        warn!("Cell handler failed: {}", e);
      }
    }
  }

  /// Drain mutation batches until every sender is dropped, flushing the lookup
  /// caches on a fixed timer.
  pub async fn run(mut self, mut mutations: mpsc::UnboundedReceiver<MutationBatch>, flush_every: Duration) {
    let mut flush = tokio::time::interval(flush_every);

    loop {
      tokio::select! {
        batch = mutations.recv() => match batch {
          Some(batch) => {
            self.handle(&batch);
          }
          None => break,
        },
        Some(result) = self.handlers.join_next(), if !self.handlers.is_empty() => {
          if let Err(e) = result {
            warn!("Cell handler failed: {}", e);
          }
        }
        _ = flush.tick() => {
          if let Err(e) = self.service.flush() {
            warn!("Failed to save lookup caches: {}", e);
          }
        }
      }
    }

    self.settle().await;
    if let Err(e) = self.service.flush() {
      warn!("Failed to save lookup caches: {}", e);
    }
  }
}

async fn resolve_content(service: &PartsService, column: Column, part: &str) -> CellContent {
  let result = service.parts().fetch(part).await;
  match column {
    Column::Stock => stock_content(&result),
    Column::Price => {
      let has_part = matches!(result, Ok(Some(_)));
      let rate = if has_part && service.exchange().currency().is_some() {
        match service.exchange().resolve().await {
          Ok(rate) => Some(rate),
          Err(e) => {
            warn!("Showing USD prices, exchange rate unavailable: {}", e);
            None
          }
        }
      } else {
        None
      };
      price_content(&result, rate.as_ref())
    }
  }
}

fn all_headers_present<P: Page>(page: &P) -> bool {
  Column::ALL.iter().all(|column| {
    HeaderLocation::ALL
      .iter()
      .all(|location| page.element_by_id(column.header_id(*location)).is_some())
  })
}

/// Size each floating header to the widest current cell of its column.
fn resize_columns<P: Page>(page: &mut P) {
  for column in Column::ALL {
    let Some(header) = page.element_by_id(column.header_id(HeaderLocation::Floating)) else {
      continue;
    };
    let widest = page
      .cells(column)
      .into_iter()
      .map(|cell| page.width(cell))
      .fold(0.0, f64::max);
    page.set_min_width(header, widest);
  }
}
