//! Node lifecycle states.
//!
//! `Created → Initialized → Linked → Ready → Running → {Completed | Faulted | Cancelled}`.
//! Transitions only move forward and a terminal state is never left.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a node.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeState {
  /// Added to the network, possibly linked, not yet initialized.
  Created = 0,
  /// Channels allocated.
  Initialized = 1,
  /// Links wired.
  Linked = 2,
  /// Sealed and waiting to run.
  Ready = 3,
  /// Processing items.
  Running = 4,
  /// Finished normally, and so did every ancestor.
  Completed = 5,
  /// Stopped on its own unrecovered error or an inherited one.
  Faulted = 6,
  /// Stopped because a descendant faulted.
  Cancelled = 7,
}

impl NodeState {
  fn from_u8(value: u8) -> Self {
    match value {
      0 => Self::Created,
      1 => Self::Initialized,
      2 => Self::Linked,
      3 => Self::Ready,
      4 => Self::Running,
      5 => Self::Completed,
      6 => Self::Faulted,
      _ => Self::Cancelled,
    }
  }

  /// Returns true for `Completed`, `Faulted` and `Cancelled`.
  pub fn is_terminal(self) -> bool {
    self >= Self::Completed
  }
}

/// Shared, monotonic state of one node.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
  pub(crate) fn get(&self) -> NodeState {
    NodeState::from_u8(self.0.load(Ordering::Acquire))
  }

  /// Moves to `next` if it is later than the current state and the current
  /// state is not terminal. Returns whether the state changed.
  pub(crate) fn advance(&self, next: NodeState) -> bool {
    self
      .0
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        let current = NodeState::from_u8(current);
        (!current.is_terminal() && next > current).then_some(next as u8)
      })
      .is_ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_state_only_moves_forward() {
    let cell = StateCell::default();
    assert!(cell.advance(NodeState::Initialized));
    assert!(cell.advance(NodeState::Ready));
    assert!(!cell.advance(NodeState::Linked));
    assert_eq!(cell.get(), NodeState::Ready);
  }

  #[test]
  fn test_terminal_state_is_final() {
    let cell = StateCell::default();
    assert!(cell.advance(NodeState::Running));
    assert!(cell.advance(NodeState::Completed));
    assert!(!cell.advance(NodeState::Cancelled));
    assert_eq!(cell.get(), NodeState::Completed);
    assert!(cell.get().is_terminal());
  }
}
