// tests/processing_strategy_tests.rs
mod common;

use common::*;
use esbflow::{AsyncSettings, EngineConfig, Flow, FlowError, ProcessingStrategy, StrategySource};
use serial_test::serial;
use std::sync::Arc;

fn config_with_default(strategy: ProcessingStrategy) -> Arc<EngineConfig> {
  Arc::new(EngineConfig::default().with_default_processing_strategy(strategy))
}

#[test]
fn test_engine_default_applies_without_configuration() {
  let flow = Flow::new("plain", Arc::new(EngineConfig::default()));
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::Default);
  assert_eq!(flow.resolved_strategy().source, StrategySource::EngineDefault);
}

#[test]
fn test_container_default_overrides_engine_default() {
  let flow = Flow::new("container", config_with_default(ProcessingStrategy::Synchronous));
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::Synchronous);
  assert_eq!(flow.resolved_strategy().source, StrategySource::ContainerDefault);
}

#[test]
fn test_explicit_strategy_wins_even_after_default_was_resolved() {
  let mut flow = Flow::new("explicit", config_with_default(ProcessingStrategy::Synchronous));
  // Resolving once memoizes the container default.
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::Synchronous);

  flow.set_processing_strategy(ProcessingStrategy::NonBlocking).unwrap();
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::NonBlocking);
  assert_eq!(flow.resolved_strategy().source, StrategySource::Explicit);
}

#[test]
fn test_builder_strategy_replaces_memoized_default() {
  let flow = Flow::new("builder-explicit", config_with_default(ProcessingStrategy::Synchronous));
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::Synchronous);

  let flow = flow.with_processing_strategy(ProcessingStrategy::NonBlocking);
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::NonBlocking);
  assert_eq!(flow.resolved_strategy().source, StrategySource::Explicit);
}

#[test]
#[should_panic(expected = "esbflow setup error")]
fn test_builder_rejects_processors_after_initialise() {
  let flow = Flow::new("builder-late", Arc::new(EngineConfig::default()))
    .with_processors(vec![appender("a")])
    .with_processing_strategy(ProcessingStrategy::Synchronous);
  flow.initialise().unwrap();
  let _ = flow.with_processors(vec![appender("b")]);
}

#[test]
fn test_max_concurrency_is_frozen_after_initialise() {
  let mut flow = Flow::new("setter-late", Arc::new(EngineConfig::default()))
    .with_processing_strategy(ProcessingStrategy::Synchronous)
    .with_max_concurrency(2);
  flow.initialise().unwrap();

  assert!(matches!(flow.set_max_concurrency(4), Err(FlowError::IllegalState { .. })));
  assert_eq!(flow.max_concurrency(), Some(2));
}

#[test]
fn test_max_concurrency_must_be_positive() {
  let mut flow = Flow::new("concurrency", Arc::new(EngineConfig::default()));
  assert_eq!(flow.max_concurrency(), None);

  let err = flow.set_max_concurrency(0).unwrap_err();
  assert!(matches!(err, FlowError::IllegalState { .. }));
  assert_eq!(flow.max_concurrency(), None);

  flow.set_max_concurrency(3).unwrap();
  assert_eq!(flow.max_concurrency(), Some(3));
}

#[test]
fn test_async_settings_reject_zero_sizes() {
  assert!(AsyncSettings::new(0, 16).is_err());
  assert!(AsyncSettings::new(4, 0).is_err());
  assert!(EngineConfig::default().with_async_workers(0, 16).is_err());
  assert_eq!(AsyncSettings::new(4, 16).unwrap().max_workers, 4);
}

#[test]
fn test_explicit_asynchronous_with_redelivery_is_invalid() {
  let flow = Flow::new("async-redelivery", Arc::new(EngineConfig::default()))
    .with_message_source(Arc::new(TestSource::plain().with_redelivery()))
    .with_processing_strategy(ProcessingStrategy::asynchronous());

  let err = flow.validate_construct().unwrap_err();
  assert!(matches!(err, FlowError::ConstructInvalid { .. }), "got {:?}", err);
}

#[test]
fn test_redelivery_without_explicit_strategy_falls_back_to_synchronous() {
  let flow = Flow::new("default-redelivery", Arc::new(EngineConfig::default()))
    .with_message_source(Arc::new(TestSource::plain().with_redelivery()));

  flow.validate_construct().unwrap();
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::Synchronous);
  assert!(flow.is_synchronous());
}

#[test]
fn test_asynchronous_container_default_with_redelivery_falls_back() {
  let flow = Flow::new("container-async", config_with_default(ProcessingStrategy::asynchronous()))
    .with_message_source(Arc::new(TestSource::plain().with_redelivery()));

  flow.validate_construct().unwrap();
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::Synchronous);
}

#[test]
fn test_non_blocking_with_capable_source_validates() {
  let flow = Flow::new("nb-ok", Arc::new(EngineConfig::default()))
    .with_message_source(Arc::new(TestSource::plain().non_blocking()))
    .with_processing_strategy(ProcessingStrategy::NonBlocking);

  flow.validate_construct().unwrap();
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::NonBlocking);
}

#[test]
fn test_non_blocking_with_plain_source_is_invalid() {
  let flow = Flow::new("nb-bad", Arc::new(EngineConfig::default()))
    .with_message_source(Arc::new(TestSource::plain()))
    .with_processing_strategy(ProcessingStrategy::NonBlocking);

  let err = flow.validate_construct().unwrap_err();
  assert!(matches!(err, FlowError::ConstructInvalid { .. }), "got {:?}", err);
}

#[test]
fn test_non_blocking_with_redelivery_on_capable_source_falls_back() {
  let flow = Flow::new("nb-redelivery", Arc::new(EngineConfig::default()))
    .with_message_source(Arc::new(TestSource::plain().non_blocking().with_redelivery()))
    .with_processing_strategy(ProcessingStrategy::NonBlocking);

  flow.validate_construct().unwrap();
  assert_eq!(flow.processing_strategy(), ProcessingStrategy::Synchronous);
}

#[tokio::test]
#[serial]
async fn test_invalid_construct_prevents_initialisation() {
  setup_tracing();
  let log = LifecycleLog::default();
  let flow = Flow::new("never-starts", Arc::new(EngineConfig::default()))
    .with_message_source(Arc::new(TestSource::new("src", &log)))
    .with_processors(vec![TrackedProcessor::new("p1", &log).shared()])
    .with_processing_strategy(ProcessingStrategy::NonBlocking);

  assert!(matches!(flow.initialise().unwrap_err(), FlowError::ConstructInvalid { .. }));
  assert!(log.entries().is_empty(), "no component may be touched by an invalid construct");
  assert!(flow.start().is_err());
}

#[test]
#[serial]
fn test_engine_config_reads_environment() {
  std::env::set_var("ESBFLOW_DEFAULT_PROCESSING_STRATEGY", "non-blocking");
  std::env::set_var("ESBFLOW_ASYNC_MAX_WORKERS", "3");
  let config = EngineConfig::from_env();
  std::env::remove_var("ESBFLOW_DEFAULT_PROCESSING_STRATEGY");
  std::env::remove_var("ESBFLOW_ASYNC_MAX_WORKERS");

  let config = config.unwrap();
  assert_eq!(config.default_processing_strategy, Some(ProcessingStrategy::NonBlocking));
  assert_eq!(config.async_max_workers, 3);
}

#[test]
#[serial]
fn test_engine_config_rejects_unknown_strategy() {
  std::env::set_var("ESBFLOW_DEFAULT_PROCESSING_STRATEGY", "sometimes");
  let result = EngineConfig::from_env();
  std::env::remove_var("ESBFLOW_DEFAULT_PROCESSING_STRATEGY");

  assert!(matches!(result.unwrap_err(), FlowError::IllegalState { .. }));
}
