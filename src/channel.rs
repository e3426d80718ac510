//! # Bounded Channels
//!
//! Every component that accepts items owns one [`Inlet`]: a bounded tokio `mpsc`
//! channel whose capacity is the node's configured capacity. Every component that
//! emits items owns one [`Outlet`]: the ordered list of routes (one per outgoing
//! link) into successor inlets.
//!
//! ## Backpressure
//!
//! Sending into a full inlet suspends the sender; receiving from an empty inlet
//! that still has live senders suspends the receiver. There is no other throttle.
//!
//! ## Lifecycle
//!
//! 1. **Allocate**: the inlet creates its channel.
//! 2. **Wire**: each link clones the inlet's sender into the source's outlet,
//!    together with the link's filter.
//! 3. **Seal**: the inlet drops its own sender and the outlet freezes its routes.
//!    From here on a channel closes exactly when every upstream outlet has been
//!    closed by its node driver.
//!
//! ## Faults
//!
//! Channels carry [`Packet`]s. Besides items, an outlet can deliver a fault packet
//! to every route; the receiving [`Intake`] turns it into
//! [`NodeExit::Upstream`] so the downstream node stops without flushing.

use crate::component::NodeExit;
use crate::config::{RecordSerializer, UnroutedPolicy};
use crate::error::PipelineError;
use crate::router::{Dispatch, Filter, accepting, dispatch};
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Unit transported by a channel.
#[derive(Debug)]
pub(crate) enum Packet<T> {
  /// A data item.
  Item(T),
  /// The upstream node faulted; no more items will follow.
  Fault(PipelineError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InletState<T> {
  sender: Option<mpsc::Sender<Packet<T>>>,
  receiver: Option<mpsc::Receiver<Packet<T>>>,
  allocated: bool,
}

/// The receiving end of a component: one bounded channel shared by all of the
/// component's predecessors.
pub struct Inlet<T> {
  state: Arc<Mutex<InletState<T>>>,
}

impl<T> Clone for Inlet<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<T> Default for Inlet<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Inlet<T> {
  /// Creates an inlet. The channel itself is allocated by the network initializer.
  pub fn new() -> Self {
    Self {
      state: Arc::new(Mutex::new(InletState {
        sender: None,
        receiver: None,
        allocated: false,
      })),
    }
  }

  /// Allocates the bounded channel. Allocating twice is a no-op.
  pub(crate) fn allocate(&self, capacity: usize) {
    let mut state = lock(&self.state);
    if state.allocated {
      return;
    }
    let (sender, receiver) = mpsc::channel(capacity);
    state.sender = Some(sender);
    state.receiver = Some(receiver);
    state.allocated = true;
  }

  /// A new sender into this inlet, available between allocation and sealing.
  pub(crate) fn sender(&self) -> Option<mpsc::Sender<Packet<T>>> {
    lock(&self.state).sender.clone()
  }

  /// Drops the inlet's own sender so the channel closes once every upstream
  /// sender is gone.
  pub(crate) fn seal(&self) {
    lock(&self.state).sender = None;
  }

  /// Takes the receiving end. Later calls get an intake that is already closed.
  pub fn open(&self, cancel: CancellationToken) -> Intake<T> {
    Intake {
      receiver: lock(&self.state).receiver.take(),
      cancel,
    }
  }
}

/// A component's view of its input: yields items until the inlet closes, an
/// upstream fault arrives or the component is cancelled.
pub struct Intake<T> {
  receiver: Option<mpsc::Receiver<Packet<T>>>,
  cancel: CancellationToken,
}

impl<T> Intake<T> {
  /// Receives the next item.
  ///
  /// Returns `Ok(None)` once every predecessor has closed its outlet. The
  /// cancellation check comes first, so a cancelled node stops before pulling
  /// another item.
  pub async fn recv(&mut self) -> Result<Option<T>, NodeExit> {
    let Some(receiver) = self.receiver.as_mut() else {
      return Ok(None);
    };
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(NodeExit::Cancelled),
      packet = receiver.recv() => match packet {
        Some(Packet::Item(item)) => Ok(Some(item)),
        Some(Packet::Fault(error)) => Err(NodeExit::Upstream(error)),
        None => Ok(None),
      },
    }
  }

  /// Converts the intake into a stream that ends when the inlet closes and
  /// yields a final `Err` on fault or cancellation.
  pub fn into_stream(mut self) -> impl Stream<Item = Result<T, NodeExit>> + Send
  where
    T: Send + 'static,
  {
    async_stream::stream! {
      loop {
        match self.recv().await {
          Ok(Some(item)) => yield Ok(item),
          Ok(None) => break,
          Err(exit) => {
            yield Err(exit);
            break;
          }
        }
      }
    }
  }
}

struct Route<T> {
  target: String,
  filter: Filter<T>,
  sender: mpsc::Sender<Packet<T>>,
}

struct Emission {
  node: String,
  unrouted: UnroutedPolicy,
  serializer: RecordSerializer,
}

struct OutletState<T> {
  pending: Mutex<Vec<Route<T>>>,
  live: RwLock<Option<Arc<[Route<T>]>>>,
  emission: Mutex<Option<Arc<Emission>>>,
  faulted: AtomicBool,
}

/// The emitting end of a component: its outgoing routes in link order.
pub struct Outlet<T> {
  state: Arc<OutletState<T>>,
}

impl<T> Clone for Outlet<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<T> Default for Outlet<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Outlet<T> {
  /// Creates an outlet with no routes.
  pub fn new() -> Self {
    Self {
      state: Arc::new(OutletState {
        pending: Mutex::new(Vec::new()),
        live: RwLock::new(None),
        emission: Mutex::new(None),
        faulted: AtomicBool::new(false),
      }),
    }
  }

  pub(crate) fn add_route(&self, target: &str, filter: Filter<T>, sender: mpsc::Sender<Packet<T>>) {
    lock(&self.state.pending).push(Route {
      target: target.to_string(),
      filter,
      sender,
    });
  }

  /// Freezes the routes wired so far.
  pub(crate) fn seal(&self, node: &str, unrouted: UnroutedPolicy, serializer: RecordSerializer) {
    let routes: Vec<Route<T>> = std::mem::take(&mut *lock(&self.state.pending));
    *self.state.live.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::from(routes));
    *lock(&self.state.emission) = Some(Arc::new(Emission {
      node: node.to_string(),
      unrouted,
      serializer,
    }));
  }

  fn routes(&self) -> Option<Arc<[Route<T>]>> {
    self
      .state
      .live
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Number of routes currently wired (pending or live).
  pub fn route_count(&self) -> usize {
    let pending = lock(&self.state.pending).len();
    pending + self.routes().map_or(0, |routes| routes.len())
  }

  /// Returns true once a fault has been delivered through this outlet.
  pub fn is_faulted(&self) -> bool {
    self.state.faulted.load(Ordering::Acquire)
  }

  /// Sends a fault packet to every route, once. Later calls are no-ops.
  pub(crate) async fn fault(&self, error: &PipelineError) {
    if self.state.faulted.swap(true, Ordering::AcqRel) {
      return;
    }
    let Some(routes) = self.routes() else {
      return;
    };
    for route in routes.iter() {
      // A receiver that is already gone has stopped on its own.
      let _ = route.sender.send(Packet::Fault(error.clone())).await;
    }
  }

  /// Drops every route; successors see end-of-input once all their other
  /// predecessors have closed too.
  pub(crate) fn close(&self) {
    self
      .state
      .live
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
  }
}

impl<T: fmt::Debug> Outlet<T> {
  /// Sends `item` to the first route whose filter accepts it.
  ///
  /// Suspends while that route's channel is full.
  pub async fn send(&self, item: T) -> Result<(), NodeExit> {
    let Some(routes) = self.routes() else {
      return self.unrouted(item);
    };
    match dispatch(routes.iter().map(|route| &route.filter), &item) {
      Dispatch::Route(index) => {
        deliver(&routes[index], item).await;
        Ok(())
      }
      Dispatch::Unrouted => self.unrouted(item),
    }
  }

  /// Sends a clone of `item` to every route whose filter accepts it, in link order.
  pub async fn broadcast(&self, item: T) -> Result<(), NodeExit>
  where
    T: Clone,
  {
    let Some(routes) = self.routes() else {
      return self.unrouted(item);
    };
    let targets: Vec<usize> = accepting(routes.iter().map(|route| &route.filter), &item).collect();
    let Some((&last, rest)) = targets.split_last() else {
      return self.unrouted(item);
    };
    for &index in rest {
      deliver(&routes[index], item.clone()).await;
    }
    deliver(&routes[last], item).await;
    Ok(())
  }

  fn unrouted(&self, item: T) -> Result<(), NodeExit> {
    let emission = lock(&self.state.emission).clone();
    let Some(emission) = emission else {
      trace!(item = ?item, "outlet not sealed, item discarded");
      return Ok(());
    };
    match emission.unrouted {
      UnroutedPolicy::Discard => {
        trace!(node = %emission.node, item = ?item, "no link accepts item, discarded");
        Ok(())
      }
      UnroutedPolicy::Fail => {
        warn!(node = %emission.node, item = ?item, "no link accepts item");
        Err(NodeExit::Fault(PipelineError::Unrouted {
          node: emission.node.clone(),
          record: (emission.serializer)(&item),
        }))
      }
    }
  }
}

async fn deliver<T>(route: &Route<T>, item: T) {
  if route.sender.send(Packet::Item(item)).await.is_err() {
    debug!(target_node = %route.target, "successor stopped receiving, item dropped");
  }
}

/// Type-erased control over a node's outlet, used by the node driver.
#[async_trait]
pub(crate) trait Outbound: Send + Sync {
  async fn fault(&self, error: &PipelineError);
  fn close(&self);
  fn is_faulted(&self) -> bool;
}

#[async_trait]
impl<T: Send + 'static> Outbound for Outlet<T> {
  async fn fault(&self, error: &PipelineError) {
    Outlet::fault(self, error).await;
  }

  fn close(&self) {
    Outlet::close(self);
  }

  fn is_faulted(&self) -> bool {
    Outlet::is_faulted(self)
  }
}

/// A typed link waiting to be wired by the network initializer.
pub(crate) trait Wiring: Send {
  /// Hooks the source outlet up to the target inlet. Returns false if the
  /// target inlet has not been allocated.
  fn wire(&self) -> bool;
}

pub(crate) struct Connection<T> {
  pub(crate) outlet: Outlet<T>,
  pub(crate) inlet: Inlet<T>,
  pub(crate) filter: Filter<T>,
  pub(crate) target: String,
}

impl<T: Send + 'static> Wiring for Connection<T> {
  fn wire(&self) -> bool {
    match self.inlet.sender() {
      Some(sender) => {
        self.outlet.add_route(&self.target, self.filter.clone(), sender);
        true
      }
      None => false,
    }
  }
}
