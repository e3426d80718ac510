//! # Source
//!
//! Produces items from an iterator, a producer callable or an async stream.
//! A source has no input and only starts when it is executed. It checks its
//! cancellation before every pull, so a fault further down stops it before it
//! emits anything else.
//!
//! A failed pull is a per-record error with an empty record: redirected when
//! an Error Sink is attached (production continues with the next pull), fatal
//! otherwise.

use crate::channel::Outlet;
use crate::component::{Component, NodeContext, NodeExit, Record};
use crate::error::BoxError;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::trace;

enum Producer<T> {
  Iter(Box<dyn Iterator<Item = T> + Send>),
  Fn(Box<dyn FnMut() -> Result<Option<T>, BoxError> + Send>),
  Stream(BoxStream<'static, Result<T, BoxError>>),
}

/// A component that emits items until its producer is exhausted.
pub struct Source<T> {
  outlet: Outlet<T>,
  producer: Producer<T>,
}

impl<T: Record> Source<T> {
  /// Emits every item of `items`.
  pub fn from_iter<I>(items: I) -> Self
  where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
  {
    Self::with_producer(Producer::Iter(Box::new(items.into_iter())))
  }

  /// Calls `next` until it returns `Ok(None)`.
  pub fn from_fn<F>(next: F) -> Self
  where
    F: FnMut() -> Result<Option<T>, BoxError> + Send + 'static,
  {
    Self::with_producer(Producer::Fn(Box::new(next)))
  }

  /// Emits the items of an async stream until it ends.
  pub fn from_stream<S>(stream: S) -> Self
  where
    S: Stream<Item = Result<T, BoxError>> + Send + 'static,
  {
    Self::with_producer(Producer::Stream(stream.boxed()))
  }

  /// Emits everything sent into `receiver` until every sender is dropped.
  pub fn from_receiver(receiver: mpsc::Receiver<T>) -> Self {
    Self::from_stream(ReceiverStream::new(receiver).map(Ok))
  }

  fn with_producer(producer: Producer<T>) -> Self {
    Self {
      outlet: Outlet::new(),
      producer,
    }
  }
}

impl<T: Record> Component for Source<T> {
  type Input = Infallible;
  type Output = T;

  fn kind(&self) -> &'static str {
    "source"
  }

  fn outlet(&self) -> Option<Outlet<T>> {
    Some(self.outlet.clone())
  }

  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    let Source { outlet, mut producer } = *self;
    Box::pin(async move {
      let mut emitted = 0usize;
      loop {
        let pulled = match &mut producer {
          Producer::Iter(items) => {
            if ctx.is_cancelled() {
              return Err(NodeExit::Cancelled);
            }
            items.next().map(Ok)
          }
          Producer::Fn(next) => {
            if ctx.is_cancelled() {
              return Err(NodeExit::Cancelled);
            }
            next().transpose()
          }
          Producer::Stream(stream) => tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => return Err(NodeExit::Cancelled),
            next = stream.next() => next,
          },
        };
        match pulled {
          Some(Ok(item)) => {
            outlet.send(item).await?;
            emitted += 1;
          }
          Some(Err(error)) => ctx.reject(String::new(), error).await?,
          None => break,
        }
      }
      trace!(node = %ctx.name(), emitted, "source exhausted");
      Ok(())
    })
  }
}
