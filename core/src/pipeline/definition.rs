// esbflow/src/pipeline/definition.rs

//! Contains the `Flow` struct definition, its configuration setters, and the
//! strategy resolution it performs before initialisation.

use crate::config::EngineConfig;
use crate::core::exception::{ExceptionListener, LoggingExceptionListener};
use crate::core::lifecycle::LifecycleState;
use crate::core::processor::Processor;
use crate::core::source::MessageSource;
use crate::error::{FlowError, FlowResult};
use crate::pipeline::dynamic::OverlayState;
use crate::pipeline::execution::FlowRuntime;
use crate::pipeline::path::ProcessorPathResolver;
use crate::strategy::{
  resolve_processing_strategy, validate_processing_strategy, ProcessingStrategy, ResolvedStrategy, SourceCapabilities,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// A flow: a message source wired to an ordered chain of processors, executed
/// under a processing strategy, with an exception listener for failures.
///
/// Configuration setters take `&mut self` and are only accepted before
/// `initialise()`. Lifecycle, processing and dynamic-pipeline operations take
/// `&self`, so a flow is usually shared behind an `Arc` once configured.
pub struct Flow {
  pub(crate) name: String,
  pub(crate) config: Arc<EngineConfig>,
  pub(crate) source: Option<Arc<dyn MessageSource>>,
  pub(crate) processors: Vec<Arc<dyn Processor>>,
  pub(crate) explicit_strategy: Option<ProcessingStrategy>,
  pub(crate) resolved_strategy: Mutex<Option<ResolvedStrategy>>,
  pub(crate) exception_listener: Arc<dyn ExceptionListener>,
  pub(crate) max_concurrency: Option<usize>,
  pub(crate) start_message_source: Option<bool>,

  pub(crate) state: Mutex<LifecycleState>,
  pub(crate) runtime: RwLock<Option<Arc<FlowRuntime>>>,
  pub(crate) overlay: Mutex<OverlayState>,
  pub(crate) paths: ProcessorPathResolver,

  stage_counter: AtomicU64,
  stage_names: Mutex<HashMap<String, String>>,
  pub(crate) dynamic_id_counter: AtomicU64,
}

impl Flow {
  pub fn new(name: impl Into<String>, config: Arc<EngineConfig>) -> Self {
    let name = name.into();
    Self {
      paths: ProcessorPathResolver::new(name.clone()),
      name,
      config,
      source: None,
      processors: Vec::new(),
      explicit_strategy: None,
      resolved_strategy: Mutex::new(None),
      exception_listener: Arc::new(LoggingExceptionListener),
      max_concurrency: None,
      start_message_source: None,
      state: Mutex::new(LifecycleState::NotInitialised),
      runtime: RwLock::new(None),
      overlay: Mutex::new(OverlayState::default()),
      stage_counter: AtomicU64::new(0),
      stage_names: Mutex::new(HashMap::new()),
      dynamic_id_counter: AtomicU64::new(0),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn config(&self) -> &Arc<EngineConfig> {
    &self.config
  }

  pub fn state(&self) -> LifecycleState {
    *self.state.lock()
  }

  pub fn source(&self) -> Option<&Arc<dyn MessageSource>> {
    self.source.as_ref()
  }

  pub fn processors(&self) -> &[Arc<dyn Processor>] {
    &self.processors
  }

  // --- Configuration, valid only before initialisation ---

  fn ensure_configurable(&self, what: &str) -> FlowResult<()> {
    let state = *self.state.lock();
    if state != LifecycleState::NotInitialised {
      return Err(FlowError::illegal_state(
        &self.name,
        format!("cannot set {} once the flow is {}", what, state),
      ));
    }
    Ok(())
  }

  pub fn set_message_source(&mut self, source: Arc<dyn MessageSource>) -> FlowResult<()> {
    self.ensure_configurable("the message source")?;
    self.source = Some(source);
    *self.resolved_strategy.lock() = None;
    Ok(())
  }

  pub fn set_message_processors(&mut self, processors: Vec<Arc<dyn Processor>>) -> FlowResult<()> {
    self.ensure_configurable("the message processors")?;
    self.processors = processors;
    self.paths.invalidate();
    Ok(())
  }

  pub fn set_processing_strategy(&mut self, strategy: ProcessingStrategy) -> FlowResult<()> {
    self.ensure_configurable("the processing strategy")?;
    self.explicit_strategy = Some(strategy);
    *self.resolved_strategy.lock() = None;
    Ok(())
  }

  pub fn set_exception_listener(&mut self, listener: Arc<dyn ExceptionListener>) -> FlowResult<()> {
    self.ensure_configurable("the exception listener")?;
    self.exception_listener = listener;
    Ok(())
  }

  /// Builder-style variants of the setters, for flows being assembled in one
  /// expression. Panics when the flow is past configuration, the same way the
  /// setters would fail.
  pub fn with_message_source(mut self, source: Arc<dyn MessageSource>) -> Self {
    let result = self.set_message_source(source);
    self.assert_configured(result)
  }

  pub fn with_processors(mut self, processors: Vec<Arc<dyn Processor>>) -> Self {
    let result = self.set_message_processors(processors);
    self.assert_configured(result)
  }

  pub fn with_processing_strategy(mut self, strategy: ProcessingStrategy) -> Self {
    let result = self.set_processing_strategy(strategy);
    self.assert_configured(result)
  }

  pub fn with_exception_listener(mut self, listener: Arc<dyn ExceptionListener>) -> Self {
    let result = self.set_exception_listener(listener);
    self.assert_configured(result)
  }

  /// Optional limit on events processed concurrently by this flow. Applies to
  /// the worker pool of the `Default` and `Asynchronous` strategies. Zero is
  /// rejected.
  pub fn set_max_concurrency(&mut self, max_concurrency: usize) -> FlowResult<()> {
    self.ensure_configurable("the max concurrency")?;
    if max_concurrency == 0 {
      return Err(FlowError::illegal_state(&self.name, "max concurrency must be greater than zero"));
    }
    self.max_concurrency = Some(max_concurrency);
    Ok(())
  }

  pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
    let result = self.set_max_concurrency(max_concurrency);
    self.assert_configured(result)
  }

  /// Whether `start()` also starts the message source. With `false` the flow
  /// starts its processors and leaves the source stopped; `stop()` then skips
  /// the source as well.
  pub fn set_start_message_source(&mut self, start: bool) -> FlowResult<()> {
    self.ensure_configurable("the initial source state")?;
    self.start_message_source = Some(start);
    Ok(())
  }

  pub fn with_start_message_source(mut self, start: bool) -> Self {
    let result = self.set_start_message_source(start);
    self.assert_configured(result)
  }

  pub fn max_concurrency(&self) -> Option<usize> {
    self.max_concurrency
  }

  /// The flow's own setting if any, else the container's `start_message_sources`.
  pub fn starts_message_source(&self) -> bool {
    self.start_message_source.unwrap_or(self.config.start_message_sources)
  }

  // Configuring a flow after initialise is a setup error, not a runtime one.
  fn assert_configured(self, result: FlowResult<()>) -> Self {
    if let Err(e) = result {
      panic!("esbflow setup error: {}", e);
    }
    self
  }

  // --- Processing strategy ---

  /// The flow's processing strategy: the explicit one if set, else the
  /// container default, else the engine default. Memoized on first resolution;
  /// after `validate_construct()` this reflects any fallback it applied.
  pub fn processing_strategy(&self) -> ProcessingStrategy {
    self.resolved().strategy
  }

  pub fn resolved_strategy(&self) -> ResolvedStrategy {
    self.resolved()
  }

  pub fn is_synchronous(&self) -> bool {
    self.processing_strategy().is_synchronous()
  }

  fn resolved(&self) -> ResolvedStrategy {
    *self
      .resolved_strategy
      .lock()
      .get_or_insert_with(|| resolve_processing_strategy(self.explicit_strategy, self.config.default_processing_strategy))
  }

  /// Checks the strategy against the message source. Fails with
  /// `ConstructInvalid` when the combination cannot work; replaces the strategy
  /// with `Synchronous` when a redelivery policy rules out hand-off from a
  /// strategy that was not explicitly asynchronous.
  #[instrument(name = "Flow::validate_construct", skip_all, fields(flow = %self.name), err(Display))]
  pub fn validate_construct(&self) -> FlowResult<()> {
    let capabilities = self.source_capabilities();
    let mut slot = self.resolved_strategy.lock();
    let resolved = *slot
      .get_or_insert_with(|| resolve_processing_strategy(self.explicit_strategy, self.config.default_processing_strategy));
    let validated = validate_processing_strategy(&self.name, resolved, capabilities)?;
    if validated != resolved {
      event!(Level::DEBUG, from = %resolved.strategy, to = %validated.strategy, "Processing strategy adjusted during validation.");
    }
    *slot = Some(validated);
    Ok(())
  }

  // Flows without a source are only reached through `process`, so they impose
  // no non-blocking source requirement.
  fn source_capabilities(&self) -> SourceCapabilities {
    match &self.source {
      None => SourceCapabilities {
        supports_non_blocking: true,
        redelivery_configured: false,
      },
      Some(source) => SourceCapabilities {
        supports_non_blocking: source.as_non_blocking().is_some(),
        redelivery_configured: source.redelivery_policy().is_some(),
      },
    }
  }

  // --- Introspection ---

  /// A name labelling an execution stage of this flow.
  ///
  /// Without a stage name every call returns a fresh `<flow>.<n>`, `n` counting
  /// up from 1. With a stage name the result is `<flow>.<stage>`, identical on
  /// every call for that stage.
  pub fn async_stage_name_source(&self, stage_name: Option<&str>) -> String {
    match stage_name {
      Some(stage) => self
        .stage_names
        .lock()
        .entry(stage.to_string())
        .or_insert_with(|| format!("{}.{}", self.name, stage))
        .clone(),
      None => {
        let n = self.stage_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}.{}", self.name, n)
      }
    }
  }

  /// Path of `processor` within this flow, e.g. `/flow-name/processors/3`, or
  /// `None` if the processor is not part of this flow's traceable topology.
  pub fn processor_path(&self, processor: &dyn Processor) -> Option<String> {
    self.paths.resolve(&self.processors, processor)
  }

  pub(crate) fn runtime(&self) -> Option<Arc<FlowRuntime>> {
    self.runtime.read().clone()
  }
}

impl std::fmt::Debug for Flow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Flow")
      .field("name", &self.name)
      .field("state", &self.state())
      .field("processors", &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>())
      .field("has_source", &self.source.is_some())
      .field("explicit_strategy", &self.explicit_strategy)
      .field("max_concurrency", &self.max_concurrency)
      .finish()
  }
}
