//! # Destinations
//!
//! Components with an input and no output:
//!
//! - [`Destination`] calls a consumer (sync or async) once per item.
//! - [`MemoryDestination`] collects items into a shared [`MemoryBuffer`].
//! - [`VoidDestination`] drains and drops everything. The network uses it for
//!   the discard side of `link_or_void`.

use super::{RecordFormat, record_text};
use crate::channel::Inlet;
use crate::component::{Component, NodeContext, NodeExit, Record};
use crate::error::BoxError;
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

enum Consumer<T> {
  Sync(Box<dyn FnMut(&T) -> Result<(), BoxError> + Send>),
  Async(Box<dyn FnMut(&T) -> BoxFuture<'static, Result<(), BoxError>> + Send>),
}

/// Calls a consumer for every delivered item. A failing item is redirected to
/// the Error Sink if one is attached and is fatal otherwise.
pub struct Destination<T> {
  inlet: Inlet<T>,
  consumer: Consumer<T>,
  format: Option<RecordFormat<T>>,
}

impl<T: Record> Destination<T> {
  /// Consumes items with a synchronous callable.
  pub fn new<F>(consume: F) -> Self
  where
    F: FnMut(&T) -> Result<(), BoxError> + Send + 'static,
  {
    Self::with_consumer(Consumer::Sync(Box::new(consume)))
  }

  /// Consumes items with an asynchronous callable, e.g. a batched write.
  pub fn from_async<F>(consume: F) -> Self
  where
    F: FnMut(&T) -> BoxFuture<'static, Result<(), BoxError>> + Send + 'static,
  {
    Self::with_consumer(Consumer::Async(Box::new(consume)))
  }

  fn with_consumer(consumer: Consumer<T>) -> Self {
    Self {
      inlet: Inlet::new(),
      consumer,
      format: None,
    }
  }

  /// Formats rejected items for error records.
  pub fn with_record_format<F>(mut self, format: F) -> Self
  where
    F: Fn(&T) -> String + Send + Sync + 'static,
  {
    self.format = Some(Arc::new(format));
    self
  }
}

impl<T: Record> Component for Destination<T> {
  type Input = T;
  type Output = Infallible;

  fn kind(&self) -> &'static str {
    "destination"
  }

  fn inlet(&self) -> Option<Inlet<T>> {
    Some(self.inlet.clone())
  }

  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    let Destination {
      inlet,
      mut consumer,
      format,
    } = *self;
    Box::pin(async move {
      let mut input = ctx.intake(&inlet);
      while let Some(item) = input.recv().await? {
        let outcome = match &mut consumer {
          Consumer::Sync(consume) => consume(&item),
          Consumer::Async(consume) => consume(&item).await,
        };
        if let Err(error) = outcome {
          let record = record_text(&ctx, format.as_ref(), &item);
          ctx.reject(record, error).await?;
        }
      }
      Ok(())
    })
  }
}

/// Shared view of the items collected by a [`MemoryDestination`].
#[derive(Debug)]
pub struct MemoryBuffer<T> {
  items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for MemoryBuffer<T> {
  fn clone(&self) -> Self {
    Self {
      items: Arc::clone(&self.items),
    }
  }
}

impl<T> Default for MemoryBuffer<T> {
  fn default() -> Self {
    Self {
      items: Arc::new(Mutex::new(Vec::new())),
    }
  }
}

impl<T> MemoryBuffer<T> {
  fn lock(&self) -> MutexGuard<'_, Vec<T>> {
    self.items.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn push(&self, item: T) {
    self.lock().push(item);
  }

  /// A copy of the items collected so far.
  pub fn snapshot(&self) -> Vec<T>
  where
    T: Clone,
  {
    self.lock().clone()
  }

  /// Removes and returns the items collected so far.
  pub fn take(&self) -> Vec<T> {
    std::mem::take(&mut *self.lock())
  }

  /// Number of items collected.
  pub fn len(&self) -> usize {
    self.lock().len()
  }

  /// Returns true if nothing was collected.
  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }
}

/// Collects every delivered item into memory.
pub struct MemoryDestination<T> {
  inlet: Inlet<T>,
  buffer: MemoryBuffer<T>,
}

impl<T: Record> MemoryDestination<T> {
  /// Creates a destination with an empty buffer.
  pub fn new() -> Self {
    Self {
      inlet: Inlet::new(),
      buffer: MemoryBuffer::default(),
    }
  }

  /// The buffer this destination collects into.
  pub fn buffer(&self) -> MemoryBuffer<T> {
    self.buffer.clone()
  }
}

impl<T: Record> Default for MemoryDestination<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Record> Component for MemoryDestination<T> {
  type Input = T;
  type Output = Infallible;

  fn kind(&self) -> &'static str {
    "memory-destination"
  }

  fn inlet(&self) -> Option<Inlet<T>> {
    Some(self.inlet.clone())
  }

  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    Box::pin(async move {
      let mut input = ctx.intake(&self.inlet);
      while let Some(item) = input.recv().await? {
        self.buffer.push(item);
      }
      Ok(())
    })
  }
}

/// Drains its input and drops every item.
pub struct VoidDestination<T> {
  inlet: Inlet<T>,
  _item: PhantomData<fn() -> T>,
}

impl<T: Record> VoidDestination<T> {
  /// Creates a void destination.
  pub fn new() -> Self {
    Self {
      inlet: Inlet::new(),
      _item: PhantomData,
    }
  }
}

impl<T: Record> Default for VoidDestination<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Record> Component for VoidDestination<T> {
  type Input = T;
  type Output = Infallible;

  fn kind(&self) -> &'static str {
    "void"
  }

  fn inlet(&self) -> Option<Inlet<T>> {
    Some(self.inlet.clone())
  }

  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    Box::pin(async move {
      let mut input = ctx.intake(&self.inlet);
      let mut discarded = 0usize;
      while input.recv().await?.is_some() {
        discarded += 1;
      }
      trace!(node = %ctx.name(), discarded, "void destination drained");
      Ok(())
    })
  }
}
