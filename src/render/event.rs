use tokio::sync::mpsc;

/// Kind of node a mutation record reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
  TableRow,
  Other,
}

/// One subtree mutation notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
  pub added: Vec<NodeKind>,
  pub removed: Vec<NodeKind>,
}

/// A batch of mutation notifications delivered together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
  pub records: Vec<MutationRecord>,
}

impl MutationBatch {
  pub fn new(records: Vec<MutationRecord>) -> Self {
    Self { records }
  }

  /// A batch reporting `count` added rows.
  pub fn rows_added(count: usize) -> Self {
    Self::new(vec![MutationRecord {
      added: vec![NodeKind::TableRow; count],
      removed: Vec::new(),
    }])
  }

  /// A batch reporting `count` removed rows.
  pub fn rows_removed(count: usize) -> Self {
    Self::new(vec![MutationRecord {
      added: Vec::new(),
      removed: vec![NodeKind::TableRow; count],
    }])
  }

  pub fn removes_rows(&self) -> bool {
    self
      .records
      .iter()
      .any(|r| r.removed.contains(&NodeKind::TableRow))
  }
}

/// Queue the page's mutation observer feeds and the render driver drains.
pub struct MutationQueue {
  tx: mpsc::UnboundedSender<MutationBatch>,
  rx: mpsc::UnboundedReceiver<MutationBatch>,
}

impl MutationQueue {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Handle for the observer side.
  pub fn sender(&self) -> mpsc::UnboundedSender<MutationBatch> {
    self.tx.clone()
  }

  /// Give up the queue's own sender so the receiver ends when the observers do.
  pub fn into_receiver(self) -> mpsc::UnboundedReceiver<MutationBatch> {
    self.rx
  }
}

impl Default for MutationQueue {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_batch_row_detection() {
    let batch = MutationBatch::new(vec![
      MutationRecord {
        added: vec![NodeKind::Other],
        removed: vec![],
      },
      MutationRecord {
        added: vec![],
        removed: vec![NodeKind::Other, NodeKind::TableRow],
      },
    ]);
    assert!(batch.removes_rows());
    assert!(!MutationBatch::default().removes_rows());
  }

  #[tokio::test]
  async fn test_queue_ends_when_senders_drop() {
    let queue = MutationQueue::new();
    let tx = queue.sender();
    let mut rx = queue.into_receiver();

    tx.send(MutationBatch::rows_added(2)).unwrap();
    drop(tx);

    assert_eq!(rx.recv().await, Some(MutationBatch::rows_added(2)));
    assert_eq!(rx.recv().await, None);
  }
}
