//! # Multicast
//!
//! Replicates every input item to each successor whose link accepts it. Each
//! successor sees its items in input order and is throttled by its own channel;
//! there is no ordering across successors.

use crate::channel::{Inlet, Outlet};
use crate::component::{Component, NodeContext, NodeExit, Record};
use futures::future::BoxFuture;
use std::marker::PhantomData;

/// A component that copies its input to all of its links.
pub struct Multicast<T> {
  inlet: Inlet<T>,
  outlet: Outlet<T>,
  _item: PhantomData<fn() -> T>,
}

impl<T: Record + Clone> Multicast<T> {
  /// Creates a multicast.
  pub fn new() -> Self {
    Self {
      inlet: Inlet::new(),
      outlet: Outlet::new(),
      _item: PhantomData,
    }
  }
}

impl<T: Record + Clone> Default for Multicast<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Record + Clone> Component for Multicast<T> {
  type Input = T;
  type Output = T;

  fn kind(&self) -> &'static str {
    "multicast"
  }

  fn inlet(&self) -> Option<Inlet<T>> {
    Some(self.inlet.clone())
  }

  fn outlet(&self) -> Option<Outlet<T>> {
    Some(self.outlet.clone())
  }

  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    Box::pin(async move {
      let mut input = ctx.intake(&self.inlet);
      while let Some(item) = input.recv().await? {
        self.outlet.broadcast(item).await?;
      }
      Ok(())
    })
  }
}
