//! # Completion, Fault and Cancellation Propagation
//!
//! For a node `N`:
//!
//! ```text
//! completion(N) = own(N) ⋈ completion(P) for every predecessor P, then cleanup
//! ```
//!
//! - **Faults flow downstream.** A failed own run or a failed predecessor fails
//!   `N`'s outlet (a fault packet reaches every successor) and resolves `N`'s
//!   completion with the same error.
//! - **Cancellation flows upstream.** When `N`'s own work faults, every node
//!   reachable through `predecessors` is cancelled (depth-first, each node
//!   visited once, so shared ancestors in diamond shapes are cancelled a single
//!   time). The walk records the triggering error on each cancelled node, and a
//!   cancelled node resolves with it.
//! - **Cleanup** closes the outlet (successors see end-of-input only after `N`
//!   and all its ancestors are done) and waits for the Error Sink to drain. The
//!   sink's input closes when the component's context is dropped, which happens
//!   as soon as the own work returns.
//!
//! A node's completion never resolves before every predecessor's completion has.

use crate::channel::Outbound;
use crate::component::{ErasedComponent, NodeContext, NodeExit};
use crate::error::PipelineError;
use crate::lifecycle::{NodeState, StateCell};
use crate::network::NodeId;
use futures::future::join_all;
use std::sync::{Arc, OnceLock};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

type Outcome = Option<Result<(), PipelineError>>;

/// A cloneable handle on a node's completion.
#[derive(Debug, Clone)]
pub struct Completion {
  node: String,
  receiver: watch::Receiver<Outcome>,
}

impl Completion {
  pub(crate) fn channel(node: &str) -> (CompletionSender, Completion) {
    let (sender, receiver) = watch::channel(None);
    (
      CompletionSender(sender),
      Completion {
        node: node.to_string(),
        receiver,
      },
    )
  }

  /// Name of the node this completion belongs to.
  pub fn node(&self) -> &str {
    &self.node
  }

  /// Returns true while the node has not resolved.
  pub fn is_pending(&self) -> bool {
    self.receiver.borrow().is_none()
  }

  /// The resolved outcome, if any.
  pub fn outcome(&self) -> Option<Result<(), PipelineError>> {
    self.receiver.borrow().clone()
  }

  /// Waits until the node resolves and returns its outcome.
  ///
  /// A node whose driver went away without resolving reports
  /// [`PipelineError::Aborted`].
  pub async fn wait(&self) -> Result<(), PipelineError> {
    let mut receiver = self.receiver.clone();
    let outcome = receiver
      .wait_for(Option::is_some)
      .await
      .map(|outcome| outcome.clone());
    match outcome {
      Ok(Some(result)) => result,
      _ => Err(PipelineError::Aborted {
        node: self.node.clone(),
      }),
    }
  }
}

#[derive(Debug)]
pub(crate) struct CompletionSender(watch::Sender<Outcome>);

impl CompletionSender {
  pub(crate) fn resolve(self, result: Result<(), PipelineError>) {
    self.0.send_replace(Some(result));
  }
}

/// A node's cancellation handle: triggered at most once, stays triggered, and
/// remembers the error that caused it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
  token: CancellationToken,
  cause: Arc<OnceLock<PipelineError>>,
}

impl CancelHandle {
  /// The token observed by the running component.
  pub fn token(&self) -> &CancellationToken {
    &self.token
  }

  /// Returns true once cancelled.
  pub fn is_cancelled(&self) -> bool {
    self.token.is_cancelled()
  }

  /// The error that triggered the cancellation.
  pub fn cause(&self) -> Option<&PipelineError> {
    self.cause.get()
  }

  /// Cancels with `cause`. Returns false if the handle was already cancelled;
  /// the first cause is kept.
  pub fn cancel(&self, cause: &PipelineError) -> bool {
    let _ = self.cause.set(cause.clone());
    let first = !self.token.is_cancelled();
    self.token.cancel();
    first
  }
}

/// Read-only snapshot of the predecessor edges and cancellation handles of an
/// arena, taken once a graph is initialized.
#[derive(Debug, Default)]
pub struct CancelGraph {
  predecessors: Vec<Vec<NodeId>>,
  handles: Vec<CancelHandle>,
}

impl CancelGraph {
  /// Builds a snapshot from per-node predecessor lists and handles, indexed by node id.
  pub fn new(predecessors: Vec<Vec<NodeId>>, handles: Vec<CancelHandle>) -> Self {
    Self {
      predecessors,
      handles,
    }
  }

  /// The handle of `node`, if it is part of the snapshot.
  pub fn handle(&self, node: NodeId) -> Option<&CancelHandle> {
    self.handles.get(node.index())
  }
}

/// Cancels every ancestor of `from` with `cause`, depth-first over predecessor
/// edges. Each node is visited once. Returns the ancestors in visit order.
pub fn cancel_upstream(graph: &CancelGraph, from: NodeId, cause: &PipelineError) -> Vec<NodeId> {
  let mut visited = vec![false; graph.predecessors.len()];
  let mut stack: Vec<NodeId> = Vec::new();
  let mut order = Vec::new();
  if let Some(first) = visited.get_mut(from.index()) {
    *first = true;
  }
  if let Some(predecessors) = graph.predecessors.get(from.index()) {
    stack.extend(predecessors.iter().rev());
  }
  while let Some(node) = stack.pop() {
    match visited.get_mut(node.index()) {
      Some(seen) if !*seen => *seen = true,
      _ => continue,
    }
    if let Some(handle) = graph.handles.get(node.index()) {
      if handle.cancel(cause) {
        trace!(node = node.index(), "ancestor cancelled");
      }
    }
    order.push(node);
    if let Some(predecessors) = graph.predecessors.get(node.index()) {
      stack.extend(predecessors.iter().rev());
    }
  }
  order
}

/// Runs one node: waits for its start gate (sources), runs the component,
/// propagates faults and cancellation, then resolves the completion.
pub(crate) struct Driver {
  pub(crate) id: NodeId,
  pub(crate) name: String,
  pub(crate) component: Box<dyn ErasedComponent>,
  pub(crate) context: NodeContext,
  pub(crate) gate: Option<oneshot::Receiver<()>>,
  pub(crate) outbound: Option<Box<dyn Outbound>>,
  pub(crate) predecessors: Vec<Completion>,
  pub(crate) error_sink: Option<Completion>,
  pub(crate) cancel: CancelHandle,
  pub(crate) graph: Arc<CancelGraph>,
  pub(crate) state: StateCell,
  pub(crate) resolver: CompletionSender,
}

enum Start {
  Run,
  Cancelled,
  Aborted,
}

impl Driver {
  pub(crate) async fn drive(self) {
    let Driver {
      id,
      name,
      component,
      context,
      gate,
      outbound,
      predecessors,
      error_sink,
      cancel,
      graph,
      state,
      resolver,
    } = self;

    let start = match gate {
      Some(gate) => tokio::select! {
        biased;
        _ = cancel.token().cancelled() => Start::Cancelled,
        opened = gate => if opened.is_ok() { Start::Run } else { Start::Aborted },
      },
      None => Start::Run,
    };

    let own = match start {
      Start::Run => {
        state.advance(NodeState::Running);
        debug!(node = %name, "node running");
        match tokio::spawn(component.start(context)).await {
          Ok(exit) => exit,
          Err(join_error) => Err(NodeExit::Fault(join_failure(&name, join_error))),
        }
      }
      Start::Cancelled => {
        drop(context);
        Err(NodeExit::Cancelled)
      }
      Start::Aborted => {
        drop(context);
        Err(NodeExit::Fault(PipelineError::Aborted { node: name.clone() }))
      }
    };

    let (own, mut terminal) = match own {
      Ok(()) => (Ok(()), NodeState::Completed),
      Err(NodeExit::Fault(fault)) => {
        error!(node = %name, error = %fault, "node faulted");
        let cancelled = cancel_upstream(&graph, id, &fault);
        if !cancelled.is_empty() {
          debug!(node = %name, ancestors = cancelled.len(), "cancelled upstream");
        }
        if let Some(outbound) = &outbound {
          outbound.fault(&fault).await;
        }
        (Err(fault), NodeState::Faulted)
      }
      Err(NodeExit::Upstream(fault)) => {
        // Sibling predecessors may still be producing into a receiver that is gone.
        let cancelled = cancel_upstream(&graph, id, &fault);
        if !cancelled.is_empty() {
          debug!(node = %name, ancestors = cancelled.len(), "fault received, cancelled upstream");
        }
        (Err(fault), NodeState::Faulted)
      }
      Err(NodeExit::Cancelled) => {
        let cause = cancel.cause().cloned().unwrap_or_else(|| PipelineError::Aborted {
          node: name.clone(),
        });
        (Err(cause), NodeState::Cancelled)
      }
    };

    let upstream: Result<(), PipelineError> = join_all(predecessors.iter().map(Completion::wait))
      .await
      .into_iter()
      .collect();
    if own.is_ok() && upstream.is_err() {
      terminal = NodeState::Faulted;
    }
    let result = own.and(upstream);

    if let Some(outbound) = outbound {
      if let Err(fault) = &result {
        if !outbound.is_faulted() {
          outbound.fault(fault).await;
        }
      }
      outbound.close();
    }

    if let Some(sink) = error_sink {
      if let Err(sink_error) = sink.wait().await {
        warn!(node = %name, error = %sink_error, "error sink did not complete cleanly");
      }
    }

    state.advance(terminal);
    match &result {
      Ok(()) => debug!(node = %name, "node completed"),
      Err(fault) => debug!(node = %name, state = ?terminal, error = %fault, "node resolved with fault"),
    }
    resolver.resolve(result);
  }
}

fn join_failure(node: &str, join_error: tokio::task::JoinError) -> PipelineError {
  if join_error.is_panic() {
    let payload = join_error.into_panic();
    let message = payload
      .downcast_ref::<&str>()
      .map(|message| message.to_string())
      .or_else(|| payload.downcast_ref::<String>().cloned())
      .unwrap_or_else(|| "non-string panic payload".to_string());
    PipelineError::Panicked {
      node: node.to_string(),
      message,
    }
  } else {
    PipelineError::Aborted {
      node: node.to_string(),
    }
  }
}
