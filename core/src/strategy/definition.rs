// esbflow/src/strategy/definition.rs

//! Processing strategy values and where a flow's strategy came from.

use crate::config::{CONFIG_OWNER, DEFAULT_ASYNC_MAX_WORKERS, DEFAULT_ASYNC_QUEUE_CAPACITY};
use crate::error::{FlowError, FlowResult};
use std::fmt;

/// Sizing of the bounded worker pool behind asynchronous hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncSettings {
  pub max_workers: usize,
  pub queue_capacity: usize,
}

impl AsyncSettings {
  /// Fails when either size is zero.
  pub fn new(max_workers: usize, queue_capacity: usize) -> FlowResult<Self> {
    if max_workers == 0 || queue_capacity == 0 {
      return Err(FlowError::illegal_state(
        CONFIG_OWNER,
        format!(
          "asynchronous pool sizes must be greater than zero (workers={}, queue={})",
          max_workers, queue_capacity
        ),
      ));
    }
    Ok(Self {
      max_workers,
      queue_capacity,
    })
  }
}

impl Default for AsyncSettings {
  fn default() -> Self {
    Self {
      max_workers: DEFAULT_ASYNC_MAX_WORKERS,
      queue_capacity: DEFAULT_ASYNC_QUEUE_CAPACITY,
    }
  }
}

/// Policy deciding how a flow executes its chain for each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStrategy {
  /// Engine default. Request-response events run on the calling task, one-way
  /// events are handed to the container's worker pool. Needs no source capability.
  Default,
  /// The chain runs on the calling task; no hand-off.
  Synchronous,
  /// Every event is queued for a worker and the caller is acknowledged
  /// immediately without a response.
  Asynchronous(AsyncSettings),
  /// The chain runs on a spawned task that may resume on any runtime thread.
  /// Requires a source implementing `NonBlockingMessageSource`.
  NonBlocking,
}

impl ProcessingStrategy {
  pub fn asynchronous() -> Self {
    ProcessingStrategy::Asynchronous(AsyncSettings::default())
  }

  /// Parses a configuration value. `settings` sizes the pool of `asynchronous`.
  pub fn parse(value: &str, settings: AsyncSettings) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "default" => Some(ProcessingStrategy::Default),
      "synchronous" | "sync" => Some(ProcessingStrategy::Synchronous),
      "asynchronous" | "async" => Some(ProcessingStrategy::Asynchronous(settings)),
      "non-blocking" | "non_blocking" | "nonblocking" => Some(ProcessingStrategy::NonBlocking),
      _ => None,
    }
  }

  pub fn is_synchronous(&self) -> bool {
    matches!(self, ProcessingStrategy::Synchronous)
  }

  pub fn is_asynchronous(&self) -> bool {
    matches!(self, ProcessingStrategy::Asynchronous(_))
  }

  pub fn is_non_blocking(&self) -> bool {
    matches!(self, ProcessingStrategy::NonBlocking)
  }
}

impl fmt::Display for ProcessingStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ProcessingStrategy::Default => f.write_str("default"),
      ProcessingStrategy::Synchronous => f.write_str("synchronous"),
      ProcessingStrategy::Asynchronous(settings) => write!(
        f,
        "asynchronous(workers={}, queue={})",
        settings.max_workers, settings.queue_capacity
      ),
      ProcessingStrategy::NonBlocking => f.write_str("non-blocking"),
    }
  }
}

/// Which precedence level supplied a flow's strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategySource {
  /// Set on the flow itself.
  Explicit,
  /// Taken from the container's `EngineConfig`.
  ContainerDefault,
  /// Neither was set; the engine's own default applies.
  EngineDefault,
}

/// A strategy together with the level it was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStrategy {
  pub strategy: ProcessingStrategy,
  pub source: StrategySource,
}
