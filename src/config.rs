//! # Network Configuration
//!
//! Explicit configuration threaded into a [`Network`](crate::Network) at construction
//! time. There is no process-wide mutable state: the only global is the
//! [`DEFAULT_CAPACITY`] constant, used when neither the network nor the node
//! sets a capacity.
//!
//! `NetworkConfig` deserializes from JSON so hosts can keep it next to the rest of
//! their settings:
//!
//! ```rust
//! use weaveflow::NetworkConfig;
//!
//! let config = NetworkConfig::from_json(r#"{ "default_capacity": 64, "unrouted": "fail" }"#)?;
//! assert_eq!(config.default_capacity, 64);
//! # Ok::<(), weaveflow::ConfigError>(())
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Channel capacity used when neither the network nor the node configures one.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Turns a record into the text stored in [`ErrorRecord::serialized_record`](crate::ErrorRecord).
pub type RecordSerializer = Arc<dyn Fn(&dyn fmt::Debug) -> String + Send + Sync>;

/// What happens to an item that no outgoing link accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnroutedPolicy {
  /// Drop the item.
  #[default]
  Discard,
  /// Fault the emitting node with [`PipelineError::Unrouted`](crate::PipelineError::Unrouted).
  Fail,
}

/// Configuration shared by every node of a network.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Capacity of each node's input channel unless overridden per node.
  pub default_capacity: usize,
  /// Policy for items no link accepts.
  pub unrouted: UnroutedPolicy,
  /// Serializer used for error records when a component has no typed formatter.
  #[serde(skip, default = "debug_serializer")]
  pub record_serializer: RecordSerializer,
}

fn debug_serializer() -> RecordSerializer {
  Arc::new(|record: &dyn fmt::Debug| format!("{:?}", record))
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      default_capacity: DEFAULT_CAPACITY,
      unrouted: UnroutedPolicy::default(),
      record_serializer: debug_serializer(),
    }
  }
}

impl fmt::Debug for NetworkConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NetworkConfig")
      .field("default_capacity", &self.default_capacity)
      .field("unrouted", &self.unrouted)
      .finish_non_exhaustive()
  }
}

impl NetworkConfig {
  /// Parses a configuration from JSON. Missing fields take their defaults.
  pub fn from_json(text: &str) -> Result<Self, ConfigError> {
    let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Sets the default channel capacity.
  pub fn with_default_capacity(mut self, capacity: usize) -> Self {
    self.default_capacity = capacity;
    self
  }

  /// Sets the unrouted-item policy.
  pub fn with_unrouted(mut self, policy: UnroutedPolicy) -> Self {
    self.unrouted = policy;
    self
  }

  /// Sets the serializer used for error records.
  pub fn with_record_serializer<F>(mut self, serializer: F) -> Self
  where
    F: Fn(&dyn fmt::Debug) -> String + Send + Sync + 'static,
  {
    self.record_serializer = Arc::new(serializer);
    self
  }

  /// Checks the configuration for values the engine cannot run with.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.default_capacity == 0 {
      return Err(ConfigError::InvalidCapacity { capacity: 0 });
    }
    Ok(())
  }

  /// Capacity for a node, honouring its override.
  pub(crate) fn capacity_for(&self, options: &NodeOptions) -> usize {
    options.capacity.unwrap_or(self.default_capacity)
  }
}

/// Per-node options given to [`Network::add_with`](crate::Network::add_with).
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
  /// Display name used in logs and errors. Defaults to `<kind>-<index>`.
  pub name: Option<String>,
  /// Input channel capacity. Defaults to the network's capacity.
  pub capacity: Option<usize>,
}

impl NodeOptions {
  /// Sets the node name.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  /// Sets the input channel capacity.
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = Some(capacity);
    self
  }
}
