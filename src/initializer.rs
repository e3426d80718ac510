//! # Network Initializer
//!
//! Prepares a connected graph for execution in three full passes, each a
//! depth-first walk from the same start node:
//!
//! 1. **Allocate**: every node allocates its input channel.
//! 2. **Wire**: every link hooks its source outlet up to its target inlet with
//!    the link's filter, and every node with an Error Sink gets a sender into
//!    the sink's input.
//! 3. **Ready**: every node seals its channels. Error Sinks are sealed like any
//!    other node, so they are ready before any record is processed.
//!
//! The walk follows predecessors, successors and the owner/sink relation in
//! both directions, so any entry point reaches the whole connected graph.
//! Each pass uses the node's own `initialized`/`linked`/`ready` flag as its
//! visited marker: a node whose flag is set is skipped, so running the
//! initializer again (from the same or another entry point) does nothing.

use crate::config::NetworkConfig;
use crate::lifecycle::NodeState;
use crate::network::{NodeId, NodeSlot};
use tracing::{debug, warn};

/// Nodes visited by each pass of one initializer run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct InitReport {
  pub(crate) allocated: Vec<NodeId>,
  pub(crate) linked: Vec<NodeId>,
  pub(crate) ready: Vec<NodeId>,
}

impl InitReport {
  /// Returns true if the run changed nothing because the graph was already ready.
  pub(crate) fn is_noop(&self) -> bool {
    self.allocated.is_empty() && self.linked.is_empty() && self.ready.is_empty()
  }
}

/// Runs the three passes over the graph containing `start`.
pub(crate) fn initialize(nodes: &mut [NodeSlot], start: NodeId, config: &NetworkConfig) -> InitReport {
  let allocated = walk(nodes, start, |slot| &mut slot.initialized, |slot| {
    if let Some(component) = &slot.component {
      component.allocate(slot.capacity);
    }
    slot.state.advance(NodeState::Initialized);
  });

  let linked = walk(nodes, start, |slot| &mut slot.linked, |slot| {
    for link in &slot.links {
      if !link.wire() {
        warn!(node = %slot.name, "link target has no allocated input, link skipped");
      }
    }
    if let Some(sink) = &slot.error_sink {
      slot.error_sender = sink.inlet().sender();
    }
    slot.state.advance(NodeState::Linked);
  });

  let ready = walk(nodes, start, |slot| &mut slot.ready, |slot| {
    if let Some(component) = &slot.component {
      component.seal(&slot.name, config);
    }
    slot.state.advance(NodeState::Ready);
  });

  if !ready.is_empty() {
    debug!(
      start = %nodes[start.index()].name,
      nodes = ready.len(),
      "network initialized"
    );
  }
  InitReport {
    allocated,
    linked,
    ready,
  }
}

/// Depth-first walk over the connected graph of `start`, visiting each node
/// whose `flag` is unset and setting it before calling `visit`. Returns the
/// visited nodes in visit order.
pub(crate) fn walk<F, V>(nodes: &mut [NodeSlot], start: NodeId, flag: F, mut visit: V) -> Vec<NodeId>
where
  F: Fn(&mut NodeSlot) -> &mut bool,
  V: FnMut(&mut NodeSlot),
{
  let mut order = Vec::new();
  let mut stack = vec![start];
  while let Some(id) = stack.pop() {
    let Some(slot) = nodes.get_mut(id.index()) else {
      continue;
    };
    let seen = flag(slot);
    if *seen {
      continue;
    }
    *seen = true;
    visit(slot);
    order.push(id);
    stack.extend(neighbours(slot).rev());
  }
  order
}

fn neighbours(slot: &NodeSlot) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
  slot
    .predecessors
    .iter()
    .chain(slot.successors.iter())
    .copied()
    .chain(slot.error_sink.as_ref().map(|sink| sink.node()))
    .chain(slot.error_owner)
}
