//! # Network
//!
//! The arena that owns every node of a pipeline, and the public API for
//! assembling and running it.
//!
//! Nodes live in a `Vec` of slots and refer to each other by [`NodeId`] index,
//! so the bidirectional `predecessors`/`successors` edges never form ownership
//! cycles. User code holds typed [`Handle`]s; a `Handle<I, O>` accepts `I` and
//! emits `O`, which lets the compiler reject a link between incompatible nodes.
//!
//! ```rust
//! use weaveflow::{MemoryDestination, Network, Source};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), weaveflow::Error> {
//! let mut network = Network::new();
//! let source = network.add(Source::from_iter(1..=10));
//! let sink = MemoryDestination::new();
//! let buffer = sink.buffer();
//! let sink = network.add(sink);
//!
//! network.link_if(&source, &sink, |n: &i32| n % 2 == 0)?;
//! network.execute(&source).await?;
//! network.wait(&sink).await?;
//! assert_eq!(buffer.snapshot(), vec![2, 4, 6, 8, 10]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Lifecycle
//!
//! Linking is only allowed while every node involved is still `Created`. The
//! first `execute_async` on any node of a connected graph runs the
//! Network Initializer for the whole graph and spawns one
//! driver task per node. Non-source nodes begin running immediately; a source
//! waits until it is executed itself. Dropping the network before a source is
//! executed resolves that source with [`PipelineError::Aborted`].

use crate::channel::{Connection, Inlet, Outlet, Packet, Wiring};
use crate::component::{Component, ErasedComponent, NodeContext, Record};
use crate::config::{NetworkConfig, NodeOptions};
use crate::error::{ConfigError, Error, PipelineError};
use crate::error_sink::{ErrorRecord, ErrorRoute, ErrorSink};
use crate::initializer::initialize;
use crate::lifecycle::{NodeState, StateCell};
use crate::nodes::VoidDestination;
use crate::propagation::{CancelGraph, CancelHandle, Completion, CompletionSender, Driver};
use crate::router::{Filter, Router};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

static NEXT_NETWORK: AtomicU64 = AtomicU64::new(1);

/// Index of a node in its network's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
  pub(crate) fn new(index: usize) -> Self {
    Self(index)
  }

  /// Position of the node in the arena.
  pub fn index(self) -> usize {
    self.0
  }
}

/// A typed reference to a node: accepts `I`, emits `O`.
///
/// `Infallible` marks a missing side (sources accept `Infallible`, destinations
/// emit `Infallible`).
pub struct Handle<I, O> {
  id: NodeId,
  network: u64,
  name: String,
  inlet: Option<Inlet<I>>,
  outlet: Option<Outlet<O>>,
}

impl<I, O> Clone for Handle<I, O> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      network: self.network,
      name: self.name.clone(),
      inlet: self.inlet.clone(),
      outlet: self.outlet.clone(),
    }
  }
}

impl<I, O> fmt::Debug for Handle<I, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Handle")
      .field("id", &self.id)
      .field("name", &self.name)
      .finish()
  }
}

impl<I, O> Handle<I, O> {
  /// The node's id.
  pub fn id(&self) -> NodeId {
    self.id
  }

  /// The node's name.
  pub fn name(&self) -> &str {
    &self.name
  }
}

/// A node's Error Sink, as seen from its owner.
pub(crate) struct ErrorSinkRef {
  handle: Handle<ErrorRecord, ErrorRecord>,
}

impl ErrorSinkRef {
  pub(crate) fn node(&self) -> NodeId {
    self.handle.id
  }

  pub(crate) fn inlet(&self) -> Inlet<ErrorRecord> {
    self.handle.inlet.clone().unwrap_or_default()
  }
}

/// One node of the arena.
pub(crate) struct NodeSlot {
  pub(crate) name: String,
  pub(crate) kind: &'static str,
  pub(crate) capacity: usize,
  pub(crate) component: Option<Box<dyn ErasedComponent>>,
  pub(crate) max_successors: Option<usize>,
  pub(crate) predecessors: Vec<NodeId>,
  pub(crate) successors: Vec<NodeId>,
  pub(crate) links: Vec<Box<dyn Wiring>>,
  pub(crate) user_links: usize,
  pub(crate) error_sink: Option<ErrorSinkRef>,
  pub(crate) error_owner: Option<NodeId>,
  pub(crate) error_sender: Option<mpsc::Sender<Packet<ErrorRecord>>>,
  pub(crate) initialized: bool,
  pub(crate) linked: bool,
  pub(crate) ready: bool,
  pub(crate) cancel: CancelHandle,
  pub(crate) state: StateCell,
  pub(crate) completion: Completion,
  pub(crate) resolver: Option<CompletionSender>,
  pub(crate) gate: Option<oneshot::Sender<()>>,
  pub(crate) gate_receiver: Option<oneshot::Receiver<()>>,
}

impl NodeSlot {
  pub(crate) fn new(name: String, component: Box<dyn ErasedComponent>, capacity: usize) -> Self {
    let (resolver, completion) = Completion::channel(&name);
    let (gate, gate_receiver) = if component.is_source() {
      let (sender, receiver) = oneshot::channel();
      (Some(sender), Some(receiver))
    } else {
      (None, None)
    };
    Self {
      kind: component.kind(),
      max_successors: component.max_successors(),
      name,
      capacity,
      component: Some(component),
      predecessors: Vec::new(),
      successors: Vec::new(),
      links: Vec::new(),
      user_links: 0,
      error_sink: None,
      error_owner: None,
      error_sender: None,
      initialized: false,
      linked: false,
      ready: false,
      cancel: CancelHandle::default(),
      state: StateCell::default(),
      completion,
      resolver: Some(resolver),
      gate,
      gate_receiver,
    }
  }
}

/// An arena of pipeline nodes and the links between them.
pub struct Network {
  id: u64,
  config: NetworkConfig,
  nodes: Vec<NodeSlot>,
}

impl Default for Network {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Network {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Network")
      .field("id", &self.id)
      .field("config", &self.config)
      .field(
        "nodes",
        &self.nodes.iter().map(|slot| slot.name.as_str()).collect::<Vec<_>>(),
      )
      .finish()
  }
}

impl Network {
  /// Creates a network with the default configuration.
  pub fn new() -> Self {
    Self {
      id: NEXT_NETWORK.fetch_add(1, Ordering::Relaxed),
      config: NetworkConfig::default(),
      nodes: Vec::new(),
    }
  }

  /// Creates a network with `config`.
  pub fn with_config(config: NetworkConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self {
      config,
      ..Self::new()
    })
  }

  /// The network's configuration.
  pub fn config(&self) -> &NetworkConfig {
    &self.config
  }

  /// Number of nodes, including internal ones (Error Sinks, void destinations).
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  /// Returns true if the network has no nodes.
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Adds a component with default options.
  pub fn add<C: Component>(&mut self, component: C) -> Handle<C::Input, C::Output> {
    let capacity = self.config.default_capacity;
    self.insert(component, None, capacity)
  }

  /// Adds a component with a custom name and/or capacity.
  pub fn add_with<C: Component>(
    &mut self,
    component: C,
    options: NodeOptions,
  ) -> Result<Handle<C::Input, C::Output>, ConfigError> {
    let capacity = self.config.capacity_for(&options);
    if capacity == 0 {
      return Err(ConfigError::InvalidCapacity { capacity });
    }
    Ok(self.insert(component, options.name, capacity))
  }

  fn insert<C: Component>(
    &mut self,
    component: C,
    name: Option<String>,
    capacity: usize,
  ) -> Handle<C::Input, C::Output> {
    let id = NodeId::new(self.nodes.len());
    let name = name.unwrap_or_else(|| format!("{}-{}", Component::kind(&component), id.index()));
    let inlet = component.inlet();
    let outlet = component.outlet();
    trace!(node = %name, kind = Component::kind(&component), capacity, "node added");
    self
      .nodes
      .push(NodeSlot::new(name.clone(), Box::new(component), capacity));
    Handle {
      id,
      network: self.id,
      name,
      inlet,
      outlet,
    }
  }

  /// Links `from` to `to`; every item `from` emits is offered to `to`.
  pub fn link<T: Record, A, B>(&mut self, from: &Handle<A, T>, to: &Handle<T, B>) -> Result<(), ConfigError> {
    self.link_with(from, to, Router::all())
  }

  /// Links `from` to `to`, forwarding only items matching `keep`.
  pub fn link_if<T, A, B, K>(&mut self, from: &Handle<A, T>, to: &Handle<T, B>, keep: K) -> Result<(), ConfigError>
  where
    T: Record,
    K: Fn(&T) -> bool + Send + Sync + 'static,
  {
    self.link_with(from, to, Router::keep(keep))
  }

  /// Links `from` to `to`, forwarding items matching `keep` and discarding
  /// items matching `void` into an internal void destination.
  pub fn link_or_void<T, A, B, K, V>(
    &mut self,
    from: &Handle<A, T>,
    to: &Handle<T, B>,
    keep: K,
    void: V,
  ) -> Result<(), ConfigError>
  where
    T: Record,
    K: Fn(&T) -> bool + Send + Sync + 'static,
    V: Fn(&T) -> bool + Send + Sync + 'static,
  {
    self.link_with(from, to, Router::keep_or_void(keep, void))
  }

  /// Links `from` to `to` with an explicit [`Router`].
  pub fn link_with<T: Record, A, B>(
    &mut self,
    from: &Handle<A, T>,
    to: &Handle<T, B>,
    router: Router<T>,
  ) -> Result<(), ConfigError> {
    self.check_owned(from)?;
    self.check_owned(to)?;
    if from.id == to.id {
      return Err(ConfigError::SelfLink {
        node: from.name.clone(),
      });
    }
    self.check_not_started(from.id)?;
    self.check_not_started(to.id)?;
    let Some(outlet) = from.outlet.clone() else {
      return Err(ConfigError::NoOutput {
        node: from.name.clone(),
      });
    };
    let Some(inlet) = to.inlet.clone() else {
      return Err(ConfigError::NoInput {
        node: to.name.clone(),
      });
    };
    let source = &self.nodes[from.id.index()];
    if source.successors.contains(&to.id) {
      return Err(ConfigError::DuplicateLink {
        source_node: from.name.clone(),
        target_node: to.name.clone(),
      });
    }
    if let Some(limit) = source.max_successors {
      if source.user_links >= limit {
        return Err(ConfigError::SuccessorLimit {
          node: from.name.clone(),
          limit,
        });
      }
    }

    self.connect(from.id, to.id, &to.name, outlet.clone(), inlet, router.keep_filter());
    self.nodes[from.id.index()].user_links += 1;
    debug!(source_node = %from.name, target_node = %to.name, conditional = router.keep_filter().is_conditional(), "linked");

    if let Some(void) = router.void_filter() {
      let name = format!("{}.void-{}", from.name, self.nodes.len());
      let sink = self.add_internal(VoidDestination::<T>::new(), name);
      if let Some(void_inlet) = sink.inlet.clone() {
        self.connect(from.id, sink.id, &sink.name, outlet, void_inlet, void);
      }
    }
    Ok(())
  }

  /// Routes per-record failures of `from` to `target`.
  ///
  /// The first call creates `from`'s Error Sink. A node has at most one sink;
  /// further calls link the same sink to more targets.
  pub fn link_errors_to<A, O, B>(
    &mut self,
    from: &Handle<A, O>,
    target: &Handle<ErrorRecord, B>,
  ) -> Result<(), ConfigError> {
    self.check_owned(from)?;
    self.check_owned(target)?;
    self.check_not_started(from.id)?;
    self.check_not_started(target.id)?;
    if target.inlet.is_none() {
      return Err(ConfigError::NoInput {
        node: target.name.clone(),
      });
    }
    let sink = match &self.nodes[from.id.index()].error_sink {
      Some(sink) => sink.handle.clone(),
      None => {
        let name = format!("{}.errors", from.name);
        let handle = self.add_internal(ErrorSink::new(), name);
        self.nodes[handle.id.index()].error_owner = Some(from.id);
        self.nodes[from.id.index()].error_sink = Some(ErrorSinkRef {
          handle: handle.clone(),
        });
        debug!(node = %from.name, sink = %handle.name, "error sink created");
        handle
      }
    };
    self.link(&sink, target)
  }

  fn add_internal<C: Component>(&mut self, component: C, name: String) -> Handle<C::Input, C::Output> {
    let capacity = self.config.default_capacity;
    self.insert(component, Some(name), capacity)
  }

  fn connect<T: Record>(
    &mut self,
    from: NodeId,
    to: NodeId,
    target: &str,
    outlet: Outlet<T>,
    inlet: Inlet<T>,
    filter: Filter<T>,
  ) {
    self.nodes[from.index()].links.push(Box::new(Connection {
      outlet,
      inlet,
      filter,
      target: target.to_string(),
    }));
    self.nodes[from.index()].successors.push(to);
    self.nodes[to.index()].predecessors.push(from);
  }

  fn check_owned<I, O>(&self, handle: &Handle<I, O>) -> Result<(), ConfigError> {
    if handle.network != self.id || handle.id.index() >= self.nodes.len() {
      return Err(ConfigError::ForeignNode {
        node: handle.name.clone(),
      });
    }
    Ok(())
  }

  fn check_not_started(&self, id: NodeId) -> Result<(), ConfigError> {
    let slot = &self.nodes[id.index()];
    if slot.initialized {
      return Err(ConfigError::AlreadyStarted {
        node: slot.name.clone(),
      });
    }
    Ok(())
  }

  /// Initializes the graph of `handle` (once), starts its nodes and, if
  /// `handle` is a source, lets it begin producing. Returns its completion.
  ///
  /// Must be called from within a tokio runtime.
  pub fn execute_async<I, O>(&mut self, handle: &Handle<I, O>) -> Result<Completion, ConfigError> {
    self.check_owned(handle)?;
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
    self.start_graph(&runtime, handle.id);
    self.open_gate(handle.id);
    Ok(self.nodes[handle.id.index()].completion.clone())
  }

  /// Executes `handle` and returns a future that waits for its completion.
  ///
  /// The graph is started when this is called, not when the future is first
  /// polled, and the future does not borrow the network, so other handles can
  /// be waited on alongside it.
  pub fn execute<I, O>(&mut self, handle: &Handle<I, O>) -> impl Future<Output = Result<(), Error>> + Send + use<I, O> {
    let started = self.execute_async(handle);
    async move {
      started?.wait().await?;
      Ok(())
    }
  }

  /// Starts every graph and every source, then waits for every node.
  ///
  /// Returns the first failure in node order.
  pub async fn execute_all(&mut self) -> Result<(), Error> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
    for index in 0..self.nodes.len() {
      self.start_graph(&runtime, NodeId::new(index));
    }
    for index in 0..self.nodes.len() {
      self.open_gate(NodeId::new(index));
    }
    let completions: Vec<Completion> = self.nodes.iter().map(|slot| slot.completion.clone()).collect();
    let results = futures::future::join_all(completions.iter().map(Completion::wait)).await;
    results.into_iter().collect::<Result<(), PipelineError>>()?;
    Ok(())
  }

  fn start_graph(&mut self, runtime: &tokio::runtime::Handle, start: NodeId) {
    let report = initialize(&mut self.nodes, start, &self.config);
    if report.is_noop() {
      return;
    }
    let graph = Arc::new(self.cancel_graph());
    for id in report.ready {
      if let Some(driver) = self.driver(id, &graph) {
        runtime.spawn(driver.drive());
      }
    }
  }

  fn cancel_graph(&self) -> CancelGraph {
    let predecessors = self
      .nodes
      .iter()
      .map(|slot| slot.predecessors.iter().copied().chain(slot.error_owner).collect())
      .collect();
    let handles = self.nodes.iter().map(|slot| slot.cancel.clone()).collect();
    CancelGraph::new(predecessors, handles)
  }

  fn driver(&mut self, id: NodeId, graph: &Arc<CancelGraph>) -> Option<Driver> {
    let predecessors = self.nodes[id.index()]
      .predecessors
      .iter()
      .map(|p| self.nodes[p.index()].completion.clone())
      .collect();
    let error_sink = self.nodes[id.index()]
      .error_sink
      .as_ref()
      .map(|sink| self.nodes[sink.node().index()].completion.clone());
    let serializer = self.config.record_serializer.clone();

    let slot = &mut self.nodes[id.index()];
    let component = slot.component.take()?;
    let resolver = slot.resolver.take()?;
    let outbound = component.outbound();
    let errors = ErrorRoute::new(&slot.name, slot.error_sender.take());
    let context = NodeContext::new(id, slot.name.clone(), slot.cancel.token().clone(), errors, serializer);
    trace!(node = %slot.name, kind = slot.kind, "driver spawned");
    Some(Driver {
      id,
      name: slot.name.clone(),
      component,
      context,
      gate: slot.gate_receiver.take(),
      outbound,
      predecessors,
      error_sink,
      cancel: slot.cancel.clone(),
      graph: Arc::clone(graph),
      state: slot.state.clone(),
      resolver,
    })
  }

  fn open_gate(&mut self, id: NodeId) {
    let slot = &mut self.nodes[id.index()];
    if let Some(gate) = slot.gate.take() {
      debug!(node = %slot.name, "source started");
      // The driver only goes away after resolving, so a failed send needs no handling.
      let _ = gate.send(());
    }
  }

  /// The completion of `handle`.
  pub fn completion<I, O>(&self, handle: &Handle<I, O>) -> Result<Completion, ConfigError> {
    self.check_owned(handle)?;
    Ok(self.nodes[handle.id.index()].completion.clone())
  }

  /// Waits for `handle` to resolve.
  ///
  /// Surfaces the triggering error unchanged if the graph faulted and no
  /// Error Sink absorbed it.
  pub fn wait<I, O>(&self, handle: &Handle<I, O>) -> impl Future<Output = Result<(), Error>> + Send + use<I, O> {
    let completion = self.completion(handle);
    async move {
      completion?.wait().await?;
      Ok(())
    }
  }

  /// Current lifecycle state of `handle`.
  pub fn state<I, O>(&self, handle: &Handle<I, O>) -> Result<NodeState, ConfigError> {
    self.check_owned(handle)?;
    Ok(self.nodes[handle.id.index()].state.get())
  }

  /// Name of the node at `id`.
  pub fn name(&self, id: NodeId) -> Option<&str> {
    self.nodes.get(id.index()).map(|slot| slot.name.as_str())
  }

  /// Kind of the node at `id`.
  pub fn kind(&self, id: NodeId) -> Option<&'static str> {
    self.nodes.get(id.index()).map(|slot| slot.kind)
  }

  /// Predecessors of the node at `id`, in link order.
  pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
    self
      .nodes
      .get(id.index())
      .map_or(&[], |slot| slot.predecessors.as_slice())
  }

  /// Successors of the node at `id`, in link order.
  pub fn successors(&self, id: NodeId) -> &[NodeId] {
    self
      .nodes
      .get(id.index())
      .map_or(&[], |slot| slot.successors.as_slice())
  }

  /// The Error Sink node of `id`, if one was created.
  pub fn error_sink(&self, id: NodeId) -> Option<NodeId> {
    self
      .nodes
      .get(id.index())
      .and_then(|slot| slot.error_sink.as_ref())
      .map(ErrorSinkRef::node)
  }

  #[cfg(test)]
  pub(crate) fn slots_mut(&mut self) -> &mut [NodeSlot] {
    &mut self.nodes
  }

  #[cfg(test)]
  pub(crate) fn slots(&self) -> &[NodeSlot] {
    &self.nodes
  }
}
