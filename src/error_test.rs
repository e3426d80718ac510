//! Tests for error types and error records.

use crate::error::{ConfigError, Error, PipelineError, StringError};
use crate::error_sink::ErrorRecord;
use std::error::Error as StdError;

#[test]
fn test_pipeline_error_messages() {
  let error = PipelineError::record("parse", "\"bad\"", Box::new(StringError("not a number".into())));
  assert_eq!(
    error.to_string(),
    "node 'parse' failed on record \"bad\": not a number"
  );
  assert_eq!(error.node(), "parse");
  assert_eq!(
    error.source().map(|source| source.to_string()),
    Some("not a number".to_string())
  );

  let error = PipelineError::Panicked {
    node: "sink".into(),
    message: "oops".into(),
  };
  assert_eq!(error.to_string(), "node 'sink' panicked: oops");
}

#[test]
fn test_clones_are_the_same_fault() {
  let error = PipelineError::component("reader", Box::new(StringError("io".into())));
  let clone = error.clone();
  assert!(error.same_fault(&clone));

  let twin = PipelineError::component("reader", Box::new(StringError("io".into())));
  assert!(!error.same_fault(&twin), "distinct sources are distinct faults");
}

#[test]
fn test_error_wraps_both_kinds() {
  let config: Error = ConfigError::NoRuntime.into();
  assert!(matches!(config, Error::Config(ConfigError::NoRuntime)));
  assert_eq!(config.to_string(), ConfigError::NoRuntime.to_string());

  let pipeline: Error = PipelineError::Aborted { node: "s".into() }.into();
  assert_eq!(pipeline.to_string(), "node 's' was aborted before it ran");
}

#[test]
fn test_config_error_messages() {
  let error = ConfigError::DuplicateLink {
    source_node: "a".into(),
    target_node: "b".into(),
  };
  assert_eq!(error.to_string(), "link from 'a' to 'b' already exists");
  assert_eq!(
    ConfigError::SuccessorLimit {
      node: "batch".into(),
      limit: 1
    }
    .to_string(),
    "node 'batch' accepts at most 1 successor(s)"
  );
}

#[test]
fn test_error_record_serializes() {
  let record = ErrorRecord::new("parse", "\"bad\"".into(), &StringError("not a number".into()));
  assert_eq!(record.node, "parse");
  assert_eq!(record.error_text, "not a number");

  let json = serde_json::to_string(&record).expect("serialize");
  let back: ErrorRecord = serde_json::from_str(&json).expect("deserialize");
  assert_eq!(back, record);
}
