//! # Predicate Router
//!
//! Per-link routing predicates. Every link carries a [`Router<T>`] typed to the
//! item it transports, so a predicate can never be applied to the wrong type.
//!
//! - A router with no predicate forwards every item.
//! - A `keep` predicate restricts forwarding to matching items.
//! - A `void` predicate marks items that must be explicitly discarded. The
//!   network realises it as an extra link into a void destination, so voided
//!   items are consumed instead of left unresolved.
//!
//! Dispatch over an outlet's routes is decided by the pure functions [`dispatch`]
//! (first match, used by ordinary components) and [`accepting`] (every match,
//! used by multicast).

use std::fmt;
use std::sync::Arc;

/// A routing predicate over items of type `T`.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// An optional predicate: `None` accepts everything.
pub struct Filter<T>(Option<Predicate<T>>);

impl<T> Filter<T> {
  /// A filter that accepts every item.
  pub fn all() -> Self {
    Self(None)
  }

  /// A filter that accepts items matching `predicate`.
  pub fn only(predicate: Predicate<T>) -> Self {
    Self(Some(predicate))
  }

  /// Returns true if the item passes this filter.
  pub fn accepts(&self, item: &T) -> bool {
    match &self.0 {
      Some(predicate) => predicate(item),
      None => true,
    }
  }

  /// Returns true if this filter has a predicate.
  pub fn is_conditional(&self) -> bool {
    self.0.is_some()
  }
}

impl<T> Clone for Filter<T> {
  fn clone(&self) -> Self {
    Self(self.0.clone())
  }
}

impl<T> fmt::Debug for Filter<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.0 {
      Some(_) => write!(f, "Filter::Only"),
      None => write!(f, "Filter::All"),
    }
  }
}

/// The keep/void predicate pair attached to a link.
pub struct Router<T> {
  keep: Filter<T>,
  void: Option<Predicate<T>>,
}

impl<T> Router<T> {
  /// Forwards every item.
  pub fn all() -> Self {
    Self {
      keep: Filter::all(),
      void: None,
    }
  }

  /// Forwards only items matching `keep`.
  pub fn keep<F>(keep: F) -> Self
  where
    F: Fn(&T) -> bool + Send + Sync + 'static,
  {
    Self {
      keep: Filter::only(Arc::new(keep)),
      void: None,
    }
  }

  /// Forwards items matching `keep` and discards items matching `void`.
  pub fn keep_or_void<K, V>(keep: K, void: V) -> Self
  where
    K: Fn(&T) -> bool + Send + Sync + 'static,
    V: Fn(&T) -> bool + Send + Sync + 'static,
  {
    Self {
      keep: Filter::only(Arc::new(keep)),
      void: Some(Arc::new(void)),
    }
  }

  /// The filter applied to the link's target.
  pub fn keep_filter(&self) -> Filter<T> {
    self.keep.clone()
  }

  /// The filter applied to the discard link, if any.
  pub fn void_filter(&self) -> Option<Filter<T>> {
    self.void.clone().map(Filter::only)
  }
}

impl<T> fmt::Debug for Router<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Router")
      .field("keep", &self.keep)
      .field("void", &self.void.is_some())
      .finish()
  }
}

/// Outcome of first-match dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
  /// Deliver to the route at this index.
  Route(usize),
  /// No route accepts the item.
  Unrouted,
}

/// Offers `item` to each filter in order and returns the first that accepts it.
pub fn dispatch<'a, T: 'a>(filters: impl IntoIterator<Item = &'a Filter<T>>, item: &T) -> Dispatch {
  filters
    .into_iter()
    .position(|filter| filter.accepts(item))
    .map_or(Dispatch::Unrouted, Dispatch::Route)
}

/// Indices of every filter that accepts `item`, in order.
pub fn accepting<'a, T: 'a>(
  filters: impl IntoIterator<Item = &'a Filter<T>> + 'a,
  item: &'a T,
) -> impl Iterator<Item = usize> + 'a {
  filters
    .into_iter()
    .enumerate()
    .filter(move |(_, filter)| filter.accepts(item))
    .map(|(index, _)| index)
}
