//! # Transform
//!
//! Maps each input item to zero or one output item. A failing item is handed
//! to [`NodeContext::reject`]: redirected when an Error Sink is attached,
//! fatal otherwise.

use super::{RecordFormat, record_text};
use crate::channel::{Inlet, Outlet};
use crate::component::{Component, NodeContext, NodeExit, Record};
use crate::error::BoxError;
use futures::future::BoxFuture;
use std::sync::Arc;

type MapFn<I, O> = Box<dyn FnMut(&I) -> Result<Option<O>, BoxError> + Send>;

/// A one-to-one (or one-to-none) mapping component.
pub struct Transform<I, O> {
  inlet: Inlet<I>,
  outlet: Outlet<O>,
  map: MapFn<I, O>,
  format: Option<RecordFormat<I>>,
}

impl<I: Record, O: Record> Transform<I, O> {
  /// Maps every item with `map`.
  pub fn new<F>(mut map: F) -> Self
  where
    F: FnMut(&I) -> Result<O, BoxError> + Send + 'static,
  {
    Self::filter_map(move |item| map(item).map(Some))
  }

  /// Maps every item with `map`; `Ok(None)` drops the item.
  pub fn filter_map<F>(map: F) -> Self
  where
    F: FnMut(&I) -> Result<Option<O>, BoxError> + Send + 'static,
  {
    Self {
      inlet: Inlet::new(),
      outlet: Outlet::new(),
      map: Box::new(map),
      format: None,
    }
  }

  /// Formats rejected items for error records.
  pub fn with_record_format<F>(mut self, format: F) -> Self
  where
    F: Fn(&I) -> String + Send + Sync + 'static,
  {
    self.format = Some(Arc::new(format));
    self
  }
}

impl<I: Record, O: Record> Component for Transform<I, O> {
  type Input = I;
  type Output = O;

  fn kind(&self) -> &'static str {
    "transform"
  }

  fn inlet(&self) -> Option<Inlet<I>> {
    Some(self.inlet.clone())
  }

  fn outlet(&self) -> Option<Outlet<O>> {
    Some(self.outlet.clone())
  }

  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    let Transform {
      inlet,
      outlet,
      mut map,
      format,
    } = *self;
    Box::pin(async move {
      let mut input = ctx.intake(&inlet);
      while let Some(item) = input.recv().await? {
        match map(&item) {
          Ok(Some(output)) => outlet.send(output).await?,
          Ok(None) => {}
          Err(error) => {
            let record = record_text(&ctx, format.as_ref(), &item);
            ctx.reject(record, error).await?;
          }
        }
      }
      Ok(())
    })
  }
}
