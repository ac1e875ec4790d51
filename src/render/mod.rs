//! Page augmentation: column injection and cell rendering driven by DOM
//! mutation notifications.

pub mod cells;
pub mod driver;
pub mod event;
pub mod page;

#[cfg(test)]
pub(crate) mod fake;

pub use driver::{RenderDriver, RenderState, TrackedElement, TrackedKind};
pub use event::{MutationBatch, MutationQueue, MutationRecord, NodeKind};
pub use page::{CellContent, Column, HeaderElement, HeaderLocation, MinimumOrder, NodeId, Page, PriceLine};
