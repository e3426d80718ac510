//! # Network Initializer Tests
//!
//! - the walk reaches the whole connected graph from any entry point
//! - a second run is a no-op
//! - Error Sinks are prepared with their owners
//! - disconnected graphs are left alone

use crate::config::NetworkConfig;
use crate::error_sink::ErrorRecord;
use crate::initializer::initialize;
use crate::lifecycle::NodeState;
use crate::network::{Network, NodeId};
use crate::nodes::{MemoryDestination, Multicast, Source, Transform};
use crate::error::BoxError;
use std::collections::HashSet;

fn ids(nodes: &[NodeId]) -> HashSet<usize> {
  nodes.iter().map(|id| id.index()).collect()
}

/// source -> split -> {left, right} -> sink, plus an unrelated pair.
fn diamond(network: &mut Network) -> [NodeId; 7] {
  let source = network.add(Source::from_iter(0..4));
  let split = network.add(Multicast::new());
  let left = network.add(Transform::new(|n: &i32| Ok::<_, BoxError>(n + 1)));
  let right = network.add(Transform::new(|n: &i32| Ok::<_, BoxError>(n * 2)));
  let sink = network.add(MemoryDestination::new());
  network.link(&source, &split).expect("link");
  network.link(&split, &left).expect("link");
  network.link(&split, &right).expect("link");
  network.link(&left, &sink).expect("link");
  network.link(&right, &sink).expect("link");

  let lonely = network.add(Source::from_iter(vec!["x"]));
  let lonely_sink = network.add(MemoryDestination::new());
  network.link(&lonely, &lonely_sink).expect("link");

  [
    source.id(),
    split.id(),
    left.id(),
    right.id(),
    sink.id(),
    lonely.id(),
    lonely_sink.id(),
  ]
}

#[test]
fn test_walk_from_any_node_reaches_connected_graph() {
  let mut network = Network::new();
  let [source, split, left, right, sink, lonely, lonely_sink] = diamond(&mut network);
  let config = NetworkConfig::default();

  let report = initialize(network.slots_mut(), right, &config);

  let expected: HashSet<usize> = [source, split, left, right, sink]
    .iter()
    .map(|id| id.index())
    .collect();
  assert_eq!(ids(&report.allocated), expected);
  assert_eq!(ids(&report.linked), expected);
  assert_eq!(ids(&report.ready), expected);
  assert_eq!(report.ready.len(), 5, "each node is visited once per pass");

  let slots = network.slots();
  for id in expected {
    let slot = &slots[id];
    assert!(slot.initialized && slot.linked && slot.ready);
    assert_eq!(slot.state.get(), NodeState::Ready);
  }
  for id in [lonely, lonely_sink] {
    let slot = &slots[id.index()];
    assert!(!slot.initialized && !slot.linked && !slot.ready);
    assert_eq!(slot.state.get(), NodeState::Created);
  }
}

#[test]
fn test_second_run_is_noop() {
  let mut network = Network::new();
  let [source, _, _, _, sink, _, _] = diamond(&mut network);
  let config = NetworkConfig::default();

  let first = initialize(network.slots_mut(), sink, &config);
  assert!(!first.is_noop());
  let again = initialize(network.slots_mut(), source, &config);
  assert!(again.is_noop());
}

#[test]
fn test_error_sink_is_prepared_with_owner() {
  let mut network = Network::new();
  let source = network.add(Source::from_iter(vec!["1"]));
  let parse = network.add(Transform::new(|s: &&str| s.parse::<i32>().map_err(BoxError::from)));
  let out = network.add(MemoryDestination::new());
  let errors = network.add(MemoryDestination::<ErrorRecord>::new());
  network.link(&source, &parse).expect("link");
  network.link(&parse, &out).expect("link");
  network.link_errors_to(&parse, &errors).expect("error link");
  let sink = network.error_sink(parse.id()).expect("sink created");

  let report = initialize(network.slots_mut(), source.id(), &NetworkConfig::default());

  let visited = ids(&report.ready);
  assert!(visited.contains(&sink.index()));
  assert!(visited.contains(&errors.id().index()));
  assert_eq!(visited.len(), network.len());
  assert!(network.slots()[parse.id().index()].error_sender.is_some());
}

#[test]
fn test_walk_from_error_target_reaches_owner() {
  let mut network = Network::new();
  let source = network.add(Source::from_iter(vec![1]));
  let check = network.add(Transform::new(|n: &i32| Ok::<_, BoxError>(*n)));
  let errors = network.add(MemoryDestination::<ErrorRecord>::new());
  network.link(&source, &check).expect("link");
  network.link_errors_to(&check, &errors).expect("error link");

  let report = initialize(network.slots_mut(), errors.id(), &NetworkConfig::default());

  let visited = ids(&report.allocated);
  assert!(visited.contains(&source.id().index()));
  assert!(visited.contains(&check.id().index()));
}
