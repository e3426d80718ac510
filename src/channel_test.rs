//! # Channel Test Suite
//!
//! Covers the bounded channel between two components:
//!
//! - **Backpressure**: a full inlet suspends the sender until the receiver reads
//! - **Ordering**: FIFO per link
//! - **Faults**: a fault packet stops the receiver without more items
//! - **Dispatch**: first-match, multicast and the unrouted policy

use crate::channel::{Inlet, Outlet};
use crate::component::NodeExit;
use crate::config::{NetworkConfig, UnroutedPolicy};
use crate::error::{PipelineError, StringError};
use crate::router::Filter;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn wired<T: Send + 'static>(capacity: usize, filter: Filter<T>, outlet: &Outlet<T>) -> Inlet<T> {
  let inlet = Inlet::new();
  inlet.allocate(capacity);
  let sender = inlet.sender().expect("allocated inlet has a sender");
  outlet.add_route("target", filter, sender);
  inlet
}

fn seal<T>(outlet: &Outlet<T>, inlets: &[&Inlet<T>], policy: UnroutedPolicy) {
  for inlet in inlets {
    inlet.seal();
  }
  outlet.seal("emitter", policy, NetworkConfig::default().record_serializer);
}

#[tokio::test]
async fn test_third_send_waits_for_reader_at_capacity_two() {
  let outlet = Outlet::new();
  let inlet = wired(2, Filter::all(), &outlet);
  seal(&outlet, &[&inlet], UnroutedPolicy::Discard);

  outlet.send(1).await.expect("first send");
  outlet.send(2).await.expect("second send");

  let blocked = {
    let outlet = outlet.clone();
    tokio::spawn(async move { outlet.send(3).await })
  };
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert!(!blocked.is_finished(), "third send should wait for a free slot");

  let mut intake = inlet.open(CancellationToken::new());
  assert_eq!(intake.recv().await.expect("recv"), Some(1));

  tokio::time::timeout(Duration::from_secs(1), blocked)
    .await
    .expect("third send should complete once a slot frees up")
    .expect("join")
    .expect("send");
  assert_eq!(intake.recv().await.expect("recv"), Some(2));
  assert_eq!(intake.recv().await.expect("recv"), Some(3));
}

#[tokio::test]
async fn test_close_ends_input_after_queued_items() {
  let outlet = Outlet::new();
  let inlet = wired(8, Filter::all(), &outlet);
  seal(&outlet, &[&inlet], UnroutedPolicy::Discard);

  for n in 0..5 {
    outlet.send(n).await.expect("send");
  }
  outlet.close();

  let items: Vec<i32> = inlet
    .open(CancellationToken::new())
    .into_stream()
    .map(|item| item.expect("no fault"))
    .collect()
    .await;
  assert_eq!(items, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_fault_packet_follows_queued_items() {
  let outlet = Outlet::new();
  let inlet = wired(8, Filter::all(), &outlet);
  seal(&outlet, &[&inlet], UnroutedPolicy::Discard);

  let fault = PipelineError::component("emitter", Box::new(StringError("boom".into())));
  outlet.send(1).await.expect("send");
  outlet.fault(&fault).await;
  outlet.fault(&fault).await;
  assert!(outlet.is_faulted());

  let mut intake = inlet.open(CancellationToken::new());
  assert_eq!(intake.recv().await.expect("recv"), Some(1));
  match intake.recv().await {
    Err(NodeExit::Upstream(received)) => assert!(received.same_fault(&fault)),
    other => panic!("expected upstream fault, got {:?}", other),
  }
}

#[tokio::test]
async fn test_fault_reaches_routes_regardless_of_filter() {
  let outlet: Outlet<i32> = Outlet::new();
  let inlet = wired(4, Filter::only(Arc::new(|_: &i32| false)), &outlet);
  seal(&outlet, &[&inlet], UnroutedPolicy::Discard);

  let fault = PipelineError::Aborted {
    node: "emitter".into(),
  };
  outlet.fault(&fault).await;
  let mut intake = inlet.open(CancellationToken::new());
  assert!(matches!(intake.recv().await, Err(NodeExit::Upstream(_))));
}

#[tokio::test]
async fn test_cancelled_intake_stops_before_queued_items() {
  let outlet = Outlet::new();
  let inlet = wired(4, Filter::all(), &outlet);
  seal(&outlet, &[&inlet], UnroutedPolicy::Discard);
  outlet.send("queued").await.expect("send");

  let cancel = CancellationToken::new();
  let mut intake = inlet.open(cancel.clone());
  cancel.cancel();
  assert!(matches!(intake.recv().await, Err(NodeExit::Cancelled)));
}

#[tokio::test]
async fn test_first_matching_route_wins() {
  let outlet = Outlet::new();
  let evens = wired(8, Filter::only(Arc::new(|n: &i32| n % 2 == 0)), &outlet);
  let rest = wired(8, Filter::all(), &outlet);
  seal(&outlet, &[&evens, &rest], UnroutedPolicy::Discard);

  for n in 1..=6 {
    outlet.send(n).await.expect("send");
  }
  outlet.close();

  let collect = |inlet: Inlet<i32>| async move {
    inlet
      .open(CancellationToken::new())
      .into_stream()
      .map(|item| item.expect("no fault"))
      .collect::<Vec<_>>()
      .await
  };
  assert_eq!(collect(evens).await, vec![2, 4, 6]);
  assert_eq!(collect(rest).await, vec![1, 3, 5]);
}

#[tokio::test]
async fn test_broadcast_reaches_every_accepting_route() {
  let outlet = Outlet::new();
  let all = wired(8, Filter::all(), &outlet);
  let big = wired(8, Filter::only(Arc::new(|n: &u8| *n > 1)), &outlet);
  seal(&outlet, &[&all, &big], UnroutedPolicy::Discard);

  for n in 1..=3u8 {
    outlet.broadcast(n).await.expect("broadcast");
  }
  outlet.close();

  let mut all = all.open(CancellationToken::new());
  let mut big = big.open(CancellationToken::new());
  let mut seen_all = Vec::new();
  while let Some(n) = all.recv().await.expect("recv") {
    seen_all.push(n);
  }
  let mut seen_big = Vec::new();
  while let Some(n) = big.recv().await.expect("recv") {
    seen_big.push(n);
  }
  assert_eq!(seen_all, vec![1, 2, 3]);
  assert_eq!(seen_big, vec![2, 3]);
}

#[tokio::test]
async fn test_unrouted_item_discarded_by_default() {
  let outlet = Outlet::new();
  let inlet = wired(4, Filter::only(Arc::new(|n: &i32| *n > 10)), &outlet);
  seal(&outlet, &[&inlet], UnroutedPolicy::Discard);

  assert!(outlet.send(3).await.is_ok());
  outlet.close();
  let mut intake = inlet.open(CancellationToken::new());
  assert_eq!(intake.recv().await.expect("recv"), None);
}

#[tokio::test]
async fn test_unrouted_item_faults_under_fail_policy() {
  let outlet = Outlet::new();
  let inlet = wired(4, Filter::only(Arc::new(|n: &i32| *n > 10)), &outlet);
  seal(&outlet, &[&inlet], UnroutedPolicy::Fail);

  match outlet.send(3).await {
    Err(NodeExit::Fault(PipelineError::Unrouted { node, record })) => {
      assert_eq!(node, "emitter");
      assert_eq!(record, "3");
    }
    other => panic!("expected unrouted fault, got {:?}", other),
  }
}

#[tokio::test]
async fn test_send_to_stopped_receiver_is_dropped() {
  let outlet = Outlet::new();
  let inlet = wired(1, Filter::all(), &outlet);
  seal(&outlet, &[&inlet], UnroutedPolicy::Discard);
  drop(inlet.open(CancellationToken::new()));

  assert!(outlet.send(1).await.is_ok());
  assert!(outlet.send(2).await.is_ok());
}

#[test]
fn test_allocate_twice_keeps_first_channel() {
  let inlet: Inlet<i32> = Inlet::new();
  assert!(inlet.sender().is_none());
  inlet.allocate(1);
  let first = inlet.sender().expect("sender");
  inlet.allocate(5);
  assert_eq!(inlet.sender().expect("sender").max_capacity(), first.max_capacity());
  inlet.seal();
  assert!(inlet.sender().is_none());
}
