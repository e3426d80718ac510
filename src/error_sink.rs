//! # Error Sink
//!
//! Per-record failure routing. A node with an attached Error Sink turns a failing
//! record into an [`ErrorRecord`] and keeps going; a node without one faults.
//!
//! The Error Sink itself is a small internal component created the first time
//! [`Network::link_errors_to`](crate::Network::link_errors_to) is called for a
//! node. Its input is fed only by its owner, and its output is linked to the
//! user's error targets like any other link. The sink's input closes when the
//! owner's driver drops its error route, so the sink can only finish after the
//! owner can no longer send it anything.

use crate::channel::{Inlet, Outlet, Packet};
use crate::component::{Component, NodeContext, NodeExit};
use crate::error::{BoxError, PipelineError};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

/// A snapshot of a record that failed processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
  /// Name of the node that rejected the record.
  pub node: String,
  /// Textual snapshot of the offending record.
  pub serialized_record: String,
  /// Description of the failure.
  pub error_text: String,
  /// When the failure was reported.
  pub report_time: DateTime<Utc>,
}

impl ErrorRecord {
  /// Creates a record stamped with the current time.
  pub fn new(node: &str, serialized_record: String, error: &(dyn StdError + Send + Sync)) -> Self {
    Self {
      node: node.to_string(),
      serialized_record,
      error_text: error.to_string(),
      report_time: Utc::now(),
    }
  }
}

/// The sending side of a node's Error Sink, held by the node's context.
#[derive(Clone)]
pub(crate) struct ErrorRoute {
  node: String,
  sender: Option<mpsc::Sender<Packet<ErrorRecord>>>,
}

impl ErrorRoute {
  pub(crate) fn new(node: &str, sender: Option<mpsc::Sender<Packet<ErrorRecord>>>) -> Self {
    Self {
      node: node.to_string(),
      sender,
    }
  }

  pub(crate) fn is_attached(&self) -> bool {
    self.sender.is_some()
  }

  /// Redirects a failed record to the Error Sink, or turns it into a fatal
  /// fault when no sink is attached (or the sink has stopped receiving).
  pub(crate) async fn report(&self, record: String, cause: BoxError) -> Result<(), NodeExit> {
    let Some(sender) = &self.sender else {
      error!(node = %self.node, record = %record, error = %cause, "record failed with no error sink attached");
      return Err(NodeExit::Fault(PipelineError::record(&self.node, record, cause)));
    };
    warn!(node = %self.node, error = %cause, "record redirected to error sink");
    let entry = ErrorRecord::new(&self.node, record, cause.as_ref());
    match sender.send(Packet::Item(entry)).await {
      Ok(()) => Ok(()),
      Err(mpsc::error::SendError(packet)) => {
        let record = match packet {
          Packet::Item(entry) => entry.serialized_record,
          Packet::Fault(_) => String::new(),
        };
        error!(node = %self.node, "error sink stopped receiving");
        Err(NodeExit::Fault(PipelineError::record(&self.node, record, cause)))
      }
    }
  }
}

/// Internal pass-through component that forwards a node's error records to the
/// linked error targets.
pub(crate) struct ErrorSink {
  inlet: Inlet<ErrorRecord>,
  outlet: Outlet<ErrorRecord>,
}

impl ErrorSink {
  pub(crate) fn new() -> Self {
    Self {
      inlet: Inlet::new(),
      outlet: Outlet::new(),
    }
  }
}

impl Component for ErrorSink {
  type Input = ErrorRecord;
  type Output = ErrorRecord;

  fn kind(&self) -> &'static str {
    "error-sink"
  }

  fn inlet(&self) -> Option<Inlet<ErrorRecord>> {
    Some(self.inlet.clone())
  }

  fn outlet(&self) -> Option<Outlet<ErrorRecord>> {
    Some(self.outlet.clone())
  }

  fn run(self: Box<Self>, ctx: NodeContext) -> BoxFuture<'static, Result<(), NodeExit>> {
    Box::pin(async move {
      let mut input = ctx.intake(&self.inlet);
      let mut forwarded = 0usize;
      while let Some(entry) = input.recv().await? {
        self.outlet.send(entry).await?;
        forwarded += 1;
      }
      trace!(node = %ctx.name(), forwarded, "error sink drained");
      Ok(())
    })
  }
}
