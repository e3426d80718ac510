//! # Component Contract
//!
//! A component is a node of the pipeline graph. It owns at most one [`Inlet`]
//! (everything its predecessors send it) and at most one [`Outlet`] (its links
//! to successors), and implements [`Component::run`]: the node's own work.
//!
//! - **Sources** have no inlet and only start when executed.
//! - **Transforms** have both and start as soon as their graph is ready.
//! - **Destinations** have only an inlet.
//!
//! The engine wraps `run` with completion, fault and cancellation handling; a
//! component only has to pull from its intake, push into its outlet and report
//! per-record failures through [`NodeContext::reject`].
//!
//! ## Example
//!
//! ```rust
//! use futures::future::BoxFuture;
//! use weaveflow::{Component, Inlet, NodeContext, NodeExit, Outlet};
//!
//! /// Emits the running total of its input.
//! struct RunningSum {
//!   inlet: Inlet<i64>,
//!   outlet: Outlet<i64>,
//! }
//!
//! impl Component for RunningSum {
//!   type Input = i64;
//!   type Output = i64;
//!
//!   fn kind(&self) -> &'static str {
//!     "running-sum"
//!   }
//!
//!   fn inlet(&self) -> Option<Inlet<i64>> {
//!     Some(self.inlet.clone())
//!   }
//!
//!   fn outlet(&self) -> Option<Outlet<i64>> {
//!     Some(self.outlet.clone())
//!   }
//!
//!   fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
//!     Box::pin(async move {
//!       let mut input = ctx.intake(&self.inlet);
//!       let mut total = 0;
//!       while let Some(value) = input.recv().await? {
//!         total += value;
//!         self.outlet.send(total).await?;
//!       }
//!       Ok(())
//!     })
//!   }
//! }
//! ```

use crate::channel::{Inlet, Intake, Outbound, Outlet};
use crate::config::{NetworkConfig, RecordSerializer};
use crate::error::{BoxError, PipelineError};
use crate::error_sink::ErrorRoute;
use crate::network::NodeId;
use futures::future::BoxFuture;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Items that can travel through the network.
///
/// Items must be `Debug` so a failing record can be turned into an
/// [`ErrorRecord`](crate::ErrorRecord).
pub trait Record: fmt::Debug + Send + 'static {}

impl<T: fmt::Debug + Send + 'static> Record for T {}

/// Why a component's own work stopped early.
#[derive(Debug, Clone)]
pub enum NodeExit {
  /// The component itself failed and nothing absorbed the failure.
  Fault(PipelineError),
  /// A predecessor faulted; the error arrived on the component's input.
  Upstream(PipelineError),
  /// The component was cancelled because a descendant faulted.
  Cancelled,
}

impl From<PipelineError> for NodeExit {
  fn from(error: PipelineError) -> Self {
    Self::Fault(error)
  }
}

/// A node of the pipeline graph.
pub trait Component: Send + 'static {
  /// Items this component accepts. `Infallible` for sources.
  type Input: Record;
  /// Items this component emits. `Infallible` for destinations.
  type Output: Record;

  /// Short kind name, used for default node names and logs.
  fn kind(&self) -> &'static str;

  /// The component's input, if it accepts items.
  fn inlet(&self) -> Option<Inlet<Self::Input>> {
    None
  }

  /// The component's output, if it emits items.
  fn outlet(&self) -> Option<Outlet<Self::Output>> {
    None
  }

  /// Maximum number of links out of this component, if limited.
  fn max_successors(&self) -> Option<usize> {
    None
  }

  /// The component's own work. Resolves once the input is exhausted (or, for
  /// sources, production is done), or early with a [`NodeExit`].
  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>>;
}

/// Type-erased view of a component held by the network arena.
pub(crate) trait ErasedComponent: Send {
  fn kind(&self) -> &'static str;
  fn is_source(&self) -> bool;
  fn max_successors(&self) -> Option<usize>;
  fn allocate(&self, capacity: usize);
  fn seal(&self, node: &str, config: &NetworkConfig);
  fn outbound(&self) -> Option<Box<dyn Outbound>>;
  fn start(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>>;
}

impl<C: Component> ErasedComponent for C {
  fn kind(&self) -> &'static str {
    Component::kind(self)
  }

  fn is_source(&self) -> bool {
    self.inlet().is_none()
  }

  fn max_successors(&self) -> Option<usize> {
    Component::max_successors(self)
  }

  fn allocate(&self, capacity: usize) {
    if let Some(inlet) = self.inlet() {
      inlet.allocate(capacity);
    }
  }

  fn seal(&self, node: &str, config: &NetworkConfig) {
    if let Some(inlet) = self.inlet() {
      inlet.seal();
    }
    if let Some(outlet) = self.outlet() {
      outlet.seal(node, config.unrouted, config.record_serializer.clone());
    }
  }

  fn outbound(&self) -> Option<Box<dyn Outbound>> {
    self
      .outlet()
      .map(|outlet| Box::new(outlet) as Box<dyn Outbound>)
  }

  fn start(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    self.run(ctx)
  }
}

/// Everything a running component needs from the engine.
pub struct NodeContext {
  id: NodeId,
  name: String,
  cancel: CancellationToken,
  errors: ErrorRoute,
  serializer: RecordSerializer,
}

impl NodeContext {
  pub(crate) fn new(
    id: NodeId,
    name: String,
    cancel: CancellationToken,
    errors: ErrorRoute,
    serializer: RecordSerializer,
  ) -> Self {
    Self {
      id,
      name,
      cancel,
      errors,
      serializer,
    }
  }

  /// The node's id in its network.
  pub fn id(&self) -> NodeId {
    self.id
  }

  /// The node's name.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The node's cancellation token. Sources check it before every pull.
  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  /// Returns true once the node has been cancelled.
  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Opens the component's inlet for reading.
  pub fn intake<T>(&self, inlet: &Inlet<T>) -> Intake<T> {
    inlet.open(self.cancel.clone())
  }

  /// Returns true if an Error Sink is attached to this node.
  pub fn has_error_sink(&self) -> bool {
    self.errors.is_attached()
  }

  /// Serializes a record with the network's record serializer.
  pub fn describe(&self, record: &dyn fmt::Debug) -> String {
    (self.serializer)(record)
  }

  /// Reports a per-record failure.
  ///
  /// With an Error Sink attached the record is redirected and `Ok(())` is
  /// returned so processing continues with the next record. Without one the
  /// failure is fatal: the returned `NodeExit` should be propagated with `?`.
  pub async fn reject(&self, record: String, error: BoxError) -> Result<(), NodeExit> {
    self.errors.report(record, error).await
  }

  /// Builds the exit for a failure of the component's own loop.
  pub fn fail(&self, error: BoxError) -> NodeExit {
    NodeExit::Fault(PipelineError::component(&self.name, error))
  }
}

impl fmt::Debug for NodeContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeContext")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("cancelled", &self.cancel.is_cancelled())
      .field("error_sink", &self.errors.is_attached())
      .finish()
  }
}
