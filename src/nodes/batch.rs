//! # Batching Adapter
//!
//! Groups a fixed count of items into a `Vec` and forwards one `Vec` per full
//! batch to its single successor. The final partial batch is forwarded when the
//! input ends normally; an inherited fault or cancellation discards it.
//!
//! A hook may inspect or rewrite each batch before it is sent. A failing hook
//! rejects the whole batch as one record.

use super::{RecordFormat, record_text};
use crate::channel::{Inlet, Outlet};
use crate::component::{Component, NodeContext, NodeExit, Record};
use crate::error::{BoxError, ConfigError};
use futures::future::BoxFuture;
use std::sync::Arc;

type BatchHook<T> = Box<dyn FnMut(Vec<T>) -> Result<Vec<T>, BoxError> + Send>;

/// Accumulates items into batches of a fixed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchBuffer<T> {
  size: usize,
  items: Vec<T>,
}

impl<T> BatchBuffer<T> {
  /// Creates a buffer for batches of `size` items.
  pub fn new(size: usize) -> Result<Self, ConfigError> {
    if size == 0 {
      return Err(ConfigError::InvalidBatchSize { size });
    }
    Ok(Self {
      size,
      items: Vec::with_capacity(size),
    })
  }

  /// Batch size.
  pub fn size(&self) -> usize {
    self.size
  }

  /// Number of buffered items.
  pub fn len(&self) -> usize {
    self.items.len()
  }

  /// Returns true if nothing is buffered.
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Adds an item. Returns the batch once it is full.
  pub fn push(&mut self, item: T) -> Option<Vec<T>> {
    self.items.push(item);
    if self.items.len() >= self.size {
      Some(std::mem::replace(&mut self.items, Vec::with_capacity(self.size)))
    } else {
      None
    }
  }

  /// Takes the partial batch, if any.
  pub fn flush(&mut self) -> Option<Vec<T>> {
    if self.items.is_empty() {
      None
    } else {
      Some(std::mem::take(&mut self.items))
    }
  }
}

/// The Batching Adapter component. Accepts `T`, emits `Vec<T>`, and allows a
/// single outgoing link.
pub struct Batcher<T> {
  inlet: Inlet<T>,
  outlet: Outlet<Vec<T>>,
  buffer: BatchBuffer<T>,
  hook: Option<BatchHook<T>>,
  format: Option<RecordFormat<Vec<T>>>,
}

impl<T: Record> Batcher<T> {
  /// Creates an adapter for batches of `size` items.
  pub fn new(size: usize) -> Result<Self, ConfigError> {
    Ok(Self {
      inlet: Inlet::new(),
      outlet: Outlet::new(),
      buffer: BatchBuffer::new(size)?,
      hook: None,
      format: None,
    })
  }

  /// Runs `hook` on every batch before it is forwarded.
  pub fn with_hook<F>(mut self, hook: F) -> Self
  where
    F: FnMut(Vec<T>) -> Result<Vec<T>, BoxError> + Send + 'static,
  {
    self.hook = Some(Box::new(hook));
    self
  }

  /// Formats rejected batches for error records.
  pub fn with_record_format<F>(mut self, format: F) -> Self
  where
    F: Fn(&Vec<T>) -> String + Send + Sync + 'static,
  {
    self.format = Some(Arc::new(format));
    self
  }
}

impl<T: Record> Component for Batcher<T> {
  type Input = T;
  type Output = Vec<T>;

  fn kind(&self) -> &'static str {
    "batcher"
  }

  fn inlet(&self) -> Option<Inlet<T>> {
    Some(self.inlet.clone())
  }

  fn outlet(&self) -> Option<Outlet<Vec<T>>> {
    Some(self.outlet.clone())
  }

  fn max_successors(&self) -> Option<usize> {
    Some(1)
  }

  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    let Batcher {
      inlet,
      outlet,
      mut buffer,
      mut hook,
      format,
    } = *self;
    Box::pin(async move {
      let mut input = ctx.intake(&inlet);
      while let Some(item) = input.recv().await? {
        if let Some(batch) = buffer.push(item) {
          forward(&ctx, &outlet, hook.as_mut(), format.as_ref(), batch).await?;
        }
      }
      if let Some(batch) = buffer.flush() {
        forward(&ctx, &outlet, hook.as_mut(), format.as_ref(), batch).await?;
      }
      Ok(())
    })
  }
}

async fn forward<T: Record>(
  ctx: &NodeContext,
  outlet: &Outlet<Vec<T>>,
  hook: Option<&mut BatchHook<T>>,
  format: Option<&RecordFormat<Vec<T>>>,
  batch: Vec<T>,
) -> Result<(), NodeExit> {
  let Some(hook) = hook else {
    return outlet.send(batch).await;
  };
  let record = record_text(ctx, format, &batch);
  match hook(batch) {
    Ok(batch) => outlet.send(batch).await,
    Err(error) => ctx.reject(record, error).await,
  }
}
