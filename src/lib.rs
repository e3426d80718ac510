//! # WeaveFlow
//!
//! An embeddable pipeline execution engine for async Rust.
//!
//! Build a directed acyclic graph of components (sources, transforms, batchers,
//! multicasts and destinations), link them with optional keep/void predicates,
//! and run the whole graph as one coordinated pipeline with:
//!
//! - **Backpressure** through bounded channels between every linked pair
//! - **Ordered shutdown**: a node only completes after every ancestor has
//! - **Fault propagation**: an unrecovered error fails every descendant and
//!   cancels every ancestor, so the graph never stays half-running
//! - **Error redirection**: per-record failures can be routed into an Error Sink
//!   instead of stopping the pipeline
//!
//! ## Quick Start
//!
//! ```rust
//! use weaveflow::{BoxError, MemoryDestination, Network, Source, Transform};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), weaveflow::Error> {
//! let mut network = Network::new();
//! let source = network.add(Source::from_iter(vec!["1", "2", "x", "4"]));
//! let parse = network.add(Transform::new(|text: &&str| {
//!   text.parse::<i64>().map_err(BoxError::from)
//! }));
//! let sink = MemoryDestination::new();
//! let parsed = sink.buffer();
//! let sink = network.add(sink);
//! let errors = MemoryDestination::new();
//! let rejected = errors.buffer();
//! let errors = network.add(errors);
//!
//! network.link(&source, &parse)?;
//! network.link(&parse, &sink)?;
//! network.link_errors_to(&parse, &errors)?;
//!
//! network.execute(&source).await?;
//! network.wait(&sink).await?;
//! network.wait(&errors).await?;
//! assert_eq!(parsed.snapshot(), vec![1, 2, 4]);
//! assert_eq!(rejected.len(), 1);
//! # Ok(())
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// Bounded channels connecting components.
pub mod channel;
/// The component contract.
pub mod component;
/// Network and node configuration.
pub mod config;
/// Error types.
pub mod error;
/// Error Sinks and error records.
pub mod error_sink;
/// Node lifecycle states.
pub mod lifecycle;
/// The node arena and the linking and execution API.
pub mod network;
/// Built-in components.
pub mod nodes;
/// Completion, fault and cancellation propagation.
pub mod propagation;
/// Keep/void link predicates and dispatch.
pub mod router;

mod initializer;

#[cfg(test)]
mod channel_test;
#[cfg(test)]
mod error_test;
#[cfg(test)]
mod initializer_test;
#[cfg(test)]
mod router_test;

pub use channel::{Inlet, Intake, Outlet};
pub use component::{Component, NodeContext, NodeExit, Record};
pub use config::{DEFAULT_CAPACITY, NetworkConfig, NodeOptions, RecordSerializer, UnroutedPolicy};
pub use error::{BoxError, ConfigError, Error, PipelineError, SharedError, StringError};
pub use error_sink::ErrorRecord;
pub use lifecycle::NodeState;
pub use network::{Handle, Network, NodeId};
pub use nodes::{
  BatchBuffer, Batcher, Destination, MemoryBuffer, MemoryDestination, Multicast, Source, Transform,
  VoidDestination,
};
pub use propagation::{CancelGraph, CancelHandle, Completion, cancel_upstream};
pub use router::{Dispatch, Filter, Predicate, Router};
