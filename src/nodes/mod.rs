//! # Built-in Components
//!
//! - **Sources**: [`Source`] (iterator, producer callable or async stream)
//! - **Transforms**: [`Transform`], [`Multicast`], [`Batcher`]
//! - **Destinations**: [`Destination`], [`MemoryDestination`], [`VoidDestination`]
//!
//! Per-record callables receive the item by reference, so a failing item can
//! still be described in its [`ErrorRecord`](crate::ErrorRecord). Components that
//! take a typed formatter (`with_record_format`) use it for that description;
//! otherwise the network's record serializer is used.

pub mod batch;
pub mod destination;
pub mod multicast;
pub mod source;
pub mod transform;

#[cfg(test)]
mod batch_test;

pub use batch::{BatchBuffer, Batcher};
pub use destination::{Destination, MemoryBuffer, MemoryDestination, VoidDestination};
pub use multicast::Multicast;
pub use source::Source;
pub use transform::Transform;

use crate::component::NodeContext;
use std::fmt;
use std::sync::Arc;

/// A typed record formatter used for error records.
pub type RecordFormat<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

pub(crate) fn record_text<T: fmt::Debug>(ctx: &NodeContext, format: Option<&RecordFormat<T>>, item: &T) -> String {
  match format {
    Some(format) => format(item),
    None => ctx.describe(item),
  }
}
