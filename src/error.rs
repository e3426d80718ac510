//! # Error Handling
//!
//! Error types for building and running a network.
//!
//! ## Taxonomy
//!
//! - **ConfigError**: raised synchronously while assembling or starting a graph
//!   (foreign handle, duplicate link, linking after start, ...). Never enters the
//!   pipeline and is never recoverable.
//! - **PipelineError**: a fault observed through a node's [`Completion`](crate::Completion).
//!   Either an unrecovered per-record error, a failure of a node's own
//!   production/consumption loop, a panic, or an aborted start.
//! - **Error**: what the blocking entry points return, either of the above.
//!
//! Cancellation is not an error kind. A cancelled node resolves with the
//! `PipelineError` that triggered the cancellation.
//!
//! ## Sharing
//!
//! A single fault is observed by many completions (every descendant and every
//! cancelled ancestor). `PipelineError` therefore keeps its source behind an
//! `Arc` and is cheap to clone; every observer sees the same underlying error.

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Error type returned by user callables (producers, transforms, consumers, hooks).
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared error source carried by [`PipelineError`].
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Configuration error raised at call time while assembling or starting a network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  /// The handle was issued by a different network.
  #[error("node '{node}' does not belong to this network")]
  ForeignNode {
    /// Name of the offending node.
    node: String,
  },
  /// A node cannot be linked to itself.
  #[error("node '{node}' cannot be linked to itself")]
  SelfLink {
    /// Name of the node.
    node: String,
  },
  /// The same source/target pair is already linked.
  #[error("link from '{source_node}' to '{target_node}' already exists")]
  DuplicateLink {
    /// Name of the emitting node.
    source_node: String,
    /// Name of the receiving node.
    target_node: String,
  },
  /// The link source has no output.
  #[error("node '{node}' has no output to link from")]
  NoOutput {
    /// Name of the node.
    node: String,
  },
  /// The link target has no input.
  #[error("node '{node}' has no input to link to")]
  NoInput {
    /// Name of the node.
    node: String,
  },
  /// The node's graph has already been initialized and can no longer be changed.
  #[error("node '{node}' belongs to a graph that has already started")]
  AlreadyStarted {
    /// Name of the node.
    node: String,
  },
  /// The node accepts a limited number of successors and that limit is reached.
  #[error("node '{node}' accepts at most {limit} successor(s)")]
  SuccessorLimit {
    /// Name of the node.
    node: String,
    /// Maximum number of successors.
    limit: usize,
  },
  /// Channel capacity must be at least one.
  #[error("invalid channel capacity {capacity}; must be at least 1")]
  InvalidCapacity {
    /// The rejected capacity.
    capacity: usize,
  },
  /// Batch size must be at least one.
  #[error("invalid batch size {size}; must be at least 1")]
  InvalidBatchSize {
    /// The rejected size.
    size: usize,
  },
  /// Execution was requested outside of a tokio runtime.
  #[error("networks must be executed from within a tokio runtime")]
  NoRuntime,
  /// Configuration text could not be parsed.
  #[error("invalid network configuration: {0}")]
  Parse(String),
}

/// A fault observed through a node's completion.
///
/// Cloning is cheap; clones share the same source error.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
  /// Processing a single record failed and no Error Sink absorbed it.
  #[error("node '{node}' failed on record {record}: {source}")]
  Record {
    /// Node that raised the error.
    node: String,
    /// Serialized snapshot of the offending record.
    record: String,
    /// The error raised by the user callable.
    #[source]
    source: SharedError,
  },
  /// The node's own production or consumption loop failed.
  #[error("node '{node}' failed: {source}")]
  Component {
    /// Node that failed.
    node: String,
    /// The underlying error.
    #[source]
    source: SharedError,
  },
  /// An item matched no outgoing route under [`UnroutedPolicy::Fail`](crate::UnroutedPolicy::Fail).
  #[error("node '{node}' produced an item no link accepts: {record}")]
  Unrouted {
    /// Node that emitted the item.
    node: String,
    /// Serialized snapshot of the item.
    record: String,
  },
  /// The node's task panicked.
  #[error("node '{node}' panicked: {message}")]
  Panicked {
    /// Node whose task panicked.
    node: String,
    /// Panic payload, when it was a string.
    message: String,
  },
  /// The node was torn down before it could run (e.g. its network was dropped
  /// before the source was executed).
  #[error("node '{node}' was aborted before it ran")]
  Aborted {
    /// Node that never ran.
    node: String,
  },
}

impl PipelineError {
  /// Builds a [`PipelineError::Record`].
  pub fn record(node: impl Into<String>, record: impl Into<String>, source: BoxError) -> Self {
    Self::Record {
      node: node.into(),
      record: record.into(),
      source: Arc::from(source),
    }
  }

  /// Builds a [`PipelineError::Component`].
  pub fn component(node: impl Into<String>, source: BoxError) -> Self {
    Self::Component {
      node: node.into(),
      source: Arc::from(source),
    }
  }

  /// Name of the node that raised this error.
  pub fn node(&self) -> &str {
    match self {
      Self::Record { node, .. }
      | Self::Component { node, .. }
      | Self::Unrouted { node, .. }
      | Self::Panicked { node, .. }
      | Self::Aborted { node } => node,
    }
  }

  /// Returns true if `other` is the same fault (same variant, same node and,
  /// for errors with a source, the very same shared source).
  pub fn same_fault(&self, other: &PipelineError) -> bool {
    match (self, other) {
      (Self::Record { source: a, .. }, Self::Record { source: b, .. })
      | (Self::Component { source: a, .. }, Self::Component { source: b, .. }) => {
        Arc::ptr_eq(a, b)
      }
      (a, b) => a.node() == b.node() && a.to_string() == b.to_string(),
    }
  }
}

/// Error returned by the blocking entry points of a [`Network`](crate::Network).
#[derive(Error, Debug, Clone)]
pub enum Error {
  /// The graph could not be started.
  #[error(transparent)]
  Config(#[from] ConfigError),
  /// The graph ran and faulted.
  #[error(transparent)]
  Pipeline(#[from] PipelineError),
}

/// A simple error type that wraps a string message.
///
/// Handy for user callables that want to fail with plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringError(pub String);

impl std::fmt::Display for StringError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl StdError for StringError {}
