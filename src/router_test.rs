//! Tests for keep/void predicates and route dispatch.

use crate::router::{Dispatch, Filter, Router, accepting, dispatch};
use proptest::prelude::*;
use std::sync::Arc;

fn threshold(min: i32) -> Filter<i32> {
  Filter::only(Arc::new(move |n: &i32| *n >= min))
}

#[test]
fn test_unconditional_filter_accepts_everything() {
  let filter = Filter::<i32>::all();
  assert!(!filter.is_conditional());
  assert!(filter.accepts(&i32::MIN));
}

#[test]
fn test_dispatch_picks_first_accepting_route() {
  let filters = vec![threshold(10), threshold(5), Filter::all()];
  assert_eq!(dispatch(&filters, &12), Dispatch::Route(0));
  assert_eq!(dispatch(&filters, &7), Dispatch::Route(1));
  assert_eq!(dispatch(&filters, &1), Dispatch::Route(2));
}

#[test]
fn test_dispatch_without_match_is_unrouted() {
  let filters = vec![threshold(10)];
  assert_eq!(dispatch(&filters, &3), Dispatch::Unrouted);
  assert_eq!(dispatch(Vec::<&Filter<i32>>::new(), &3), Dispatch::Unrouted);
}

#[test]
fn test_accepting_lists_every_match_in_order() {
  let filters = vec![threshold(10), Filter::all(), threshold(0)];
  let matched: Vec<usize> = accepting(&filters, &4).collect();
  assert_eq!(matched, vec![1, 2]);
}

#[test]
fn test_router_void_filter() {
  let router = Router::keep_or_void(|n: &i32| n % 2 == 0, |n: &i32| *n < 100);
  let keep = router.keep_filter();
  let void = router.void_filter().expect("void predicate");
  assert!(keep.accepts(&4));
  assert!(!keep.accepts(&5));
  assert!(void.accepts(&5));
  assert!(!void.accepts(&101));

  assert!(Router::<i32>::keep(|_| true).void_filter().is_none());
  assert!(!Router::<i32>::all().keep_filter().is_conditional());
}

proptest! {
  #[test]
  fn test_dispatch_agrees_with_first_accepting(
    thresholds in prop::collection::vec(-50i32..50, 0..8),
    item in -60i32..60,
  ) {
    let filters: Vec<Filter<i32>> = thresholds.iter().copied().map(threshold).collect();
    let expected = accepting(&filters, &item)
      .next()
      .map_or(Dispatch::Unrouted, Dispatch::Route);
    prop_assert_eq!(dispatch(&filters, &item), expected);
  }
}
