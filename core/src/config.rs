// esbflow/src/config.rs

//! Container-wide configuration consulted by every flow of a container.

use crate::error::{FlowError, FlowResult};
use crate::strategy::{AsyncSettings, ProcessingStrategy};
use std::env;

pub const DEFAULT_ASYNC_MAX_WORKERS: usize = 16;
pub const DEFAULT_ASYNC_QUEUE_CAPACITY: usize = 1024;

pub(crate) const CONFIG_OWNER: &str = "<config>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Strategy used by flows that do not set one explicitly.
  pub default_processing_strategy: Option<ProcessingStrategy>,
  /// Worker pool sizing for the `Default` strategy's one-way hand-off.
  pub async_max_workers: usize,
  pub async_queue_capacity: usize,
  /// Whether starting a flow also starts its message source. Flows may override it.
  pub start_message_sources: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_processing_strategy: None,
      async_max_workers: DEFAULT_ASYNC_MAX_WORKERS,
      async_queue_capacity: DEFAULT_ASYNC_QUEUE_CAPACITY,
      start_message_sources: true,
    }
  }
}

impl EngineConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Loads configuration from the environment, reading a `.env` file first if present.
  ///
  /// Recognised variables:
  /// - `ESBFLOW_DEFAULT_PROCESSING_STRATEGY`: `default`, `synchronous`, `asynchronous` or `non-blocking`
  /// - `ESBFLOW_ASYNC_MAX_WORKERS`
  /// - `ESBFLOW_ASYNC_QUEUE_CAPACITY`
  /// - `ESBFLOW_START_MESSAGE_SOURCES`: `true` or `false`
  pub fn from_env() -> FlowResult<Self> {
    dotenvy::dotenv().ok();

    let mut config = Self::default();

    if let Ok(value) = env::var("ESBFLOW_ASYNC_MAX_WORKERS") {
      config.async_max_workers = parse_positive("ESBFLOW_ASYNC_MAX_WORKERS", &value)?;
    }
    if let Ok(value) = env::var("ESBFLOW_ASYNC_QUEUE_CAPACITY") {
      config.async_queue_capacity = parse_positive("ESBFLOW_ASYNC_QUEUE_CAPACITY", &value)?;
    }
    if let Ok(value) = env::var("ESBFLOW_START_MESSAGE_SOURCES") {
      config.start_message_sources = value.trim().parse::<bool>().map_err(|e| {
        FlowError::illegal_state(CONFIG_OWNER, format!("Invalid ESBFLOW_START_MESSAGE_SOURCES: {}", e))
      })?;
    }
    if let Ok(value) = env::var("ESBFLOW_DEFAULT_PROCESSING_STRATEGY") {
      let settings = AsyncSettings::new(config.async_max_workers, config.async_queue_capacity)?;
      config.default_processing_strategy = Some(ProcessingStrategy::parse(&value, settings).ok_or_else(|| {
        FlowError::illegal_state(
          CONFIG_OWNER,
          format!("Invalid ESBFLOW_DEFAULT_PROCESSING_STRATEGY value '{}'", value),
        )
      })?);
    }

    tracing::debug!(config = ?config, "Engine configuration loaded.");
    Ok(config)
  }

  pub fn with_default_processing_strategy(mut self, strategy: ProcessingStrategy) -> Self {
    self.default_processing_strategy = Some(strategy);
    self
  }

  /// Sizes the `Default` strategy's worker pool. Both values must be positive.
  pub fn with_async_workers(mut self, max_workers: usize, queue_capacity: usize) -> FlowResult<Self> {
    let settings = AsyncSettings::new(max_workers, queue_capacity)?;
    self.async_max_workers = settings.max_workers;
    self.async_queue_capacity = settings.queue_capacity;
    Ok(self)
  }

  pub fn with_start_message_sources(mut self, start: bool) -> Self {
    self.start_message_sources = start;
    self
  }

  /// Worker pool settings derived from this configuration.
  pub fn async_settings(&self) -> FlowResult<AsyncSettings> {
    AsyncSettings::new(self.async_max_workers, self.async_queue_capacity)
  }
}

fn parse_positive(var_name: &str, value: &str) -> FlowResult<usize> {
  match value.trim().parse::<usize>() {
    Ok(n) if n > 0 => Ok(n),
    Ok(_) => Err(FlowError::illegal_state(CONFIG_OWNER, format!("{} must be greater than zero", var_name))),
    Err(e) => Err(FlowError::illegal_state(CONFIG_OWNER, format!("Invalid {}: {}", var_name, e))),
  }
}
