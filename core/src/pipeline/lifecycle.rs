// esbflow/src/pipeline/lifecycle.rs

//! Lifecycle of a flow: initialise, start, stop and dispose, walked across the
//! exception listener, the processors and the message source.

use crate::chain::ProcessorChain;
use crate::core::lifecycle::{self, LifecycleMember, LifecycleState};
use crate::core::processor::Processor;
use crate::error::{FlowError, FlowResult, LifecyclePhase};
use crate::pipeline::definition::Flow;
use crate::pipeline::dynamic::OverlayState;
use crate::pipeline::execution::{FlowListener, FlowRuntime};
use crate::strategy::pool::AsyncWorkerPool;
use crate::strategy::{AsyncSettings, ProcessingStrategy};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{event, instrument, Level};

impl Flow {
  // Start order. The source comes last so no event arrives before the chain
  // is ready; shutdown walks the list backwards. Overlay processors that are
  // also static processors are walked once, as static ones.
  fn lifecycle_members<'a>(&'a self, overlay: &'a OverlayState, with_source: bool) -> Vec<LifecycleMember<'a>> {
    let mut members: Vec<LifecycleMember<'a>> = Vec::with_capacity(self.processors.len() + 2);
    members.push(("exception-listener", self.exception_listener.lifecycle()));
    members.extend(self.processors.iter().map(|p| (p.name(), p.lifecycle())));
    members.extend(overlay.members(self.static_processor_keys()));
    if with_source {
      if let Some(source) = &self.source {
        members.push((source.name(), source.lifecycle()));
      }
    }
    members
  }

  // The flow's max concurrency, when set, caps the number of workers.
  fn worker_pool(&self, settings: AsyncSettings) -> FlowResult<AsyncWorkerPool> {
    let max_workers = match self.max_concurrency {
      Some(limit) => limit,
      None => settings.max_workers,
    };
    let settings = AsyncSettings::new(max_workers, settings.queue_capacity)?;
    Ok(AsyncWorkerPool::new(self.name.clone(), settings))
  }

  /// Validates the construct, builds the runtime and initialises every
  /// component. A failing component causes the ones already initialised to be
  /// disposed; the flow stays `NotInitialised`.
  #[instrument(name = "Flow::initialise", skip_all, fields(flow = %self.name), err(Display))]
  pub fn initialise(&self) -> FlowResult<()> {
    let mut state = self.state.lock();
    if *state != LifecycleState::NotInitialised {
      return Err(FlowError::illegal_state(
        &self.name,
        format!("cannot initialise a flow that is {}", *state),
      ));
    }

    self.validate_construct()?;
    let strategy = self.processing_strategy();

    let static_chain = Arc::new(ProcessorChain::new(
      format!("'{}' processor chain", self.name),
      self.processors.clone(),
    ));
    let pool = match strategy {
      ProcessingStrategy::Default => Some(self.worker_pool(self.config.async_settings()?)?),
      ProcessingStrategy::Asynchronous(settings) => Some(self.worker_pool(settings)?),
      ProcessingStrategy::Synchronous | ProcessingStrategy::NonBlocking => None,
    };
    let runtime = Arc::new(FlowRuntime::new(
      self.name.clone(),
      strategy,
      static_chain,
      Arc::clone(&self.exception_listener),
      self.source.clone(),
      pool,
    ));
    if let Some(source) = &self.source {
      source.set_listener(FlowListener::new(&runtime));
    }

    {
      let overlay = self.overlay.lock();
      lifecycle::initialise_in_order(&self.name, &self.lifecycle_members(&overlay, true))?;
    }

    *self.runtime.write() = Some(runtime);
    *state = LifecycleState::Initialised;
    event!(Level::INFO, strategy = %strategy, processors = self.processors.len(), "Flow initialised.");
    Ok(())
  }

  /// Starts the worker pool and every component, the source last. The source
  /// is left stopped when `starts_message_source()` is false.
  ///
  /// If a component fails to start, every component started so far (the
  /// failing one included) is stopped in reverse order and the original error
  /// is returned. The flow keeps its previous state. Starting a started flow is
  /// a no-op.
  #[instrument(name = "Flow::start", skip_all, fields(flow = %self.name), err(Display))]
  pub fn start(&self) -> FlowResult<()> {
    let mut state = self.state.lock();
    match *state {
      LifecycleState::Started => return Ok(()),
      LifecycleState::Initialised | LifecycleState::Stopped => {}
      other => {
        return Err(FlowError::illegal_state(
          &self.name,
          format!("cannot start a flow that is {}", other),
        ))
      }
    }
    let runtime = self
      .runtime()
      .ok_or_else(|| FlowError::Internal(format!("flow '{}' is initialised without a runtime", self.name)))?;

    if let Some(pool) = &runtime.pool {
      pool.start(|| self.async_stage_name_source(None))?;
    }
    runtime.accepting.store(true, Ordering::Release);

    let overlay = self.overlay.lock();
    let members = self.lifecycle_members(&overlay, self.starts_message_source());
    if let Err(e) = lifecycle::start_in_order(&self.name, &members) {
      runtime.accepting.store(false, Ordering::Release);
      if let Some(pool) = &runtime.pool {
        pool.stop();
      }
      return Err(e);
    }

    *state = LifecycleState::Started;
    event!(Level::INFO, "Flow started.");
    Ok(())
  }

  /// Stops the source first, then the remaining components in reverse start
  /// order, and closes the worker pool. Individual failures are logged and
  /// skipped. Stopping a flow that is not started is a no-op.
  #[instrument(name = "Flow::stop", skip_all, fields(flow = %self.name), err(Display))]
  pub fn stop(&self) -> FlowResult<()> {
    let mut state = self.state.lock();
    if !state.is_started() {
      event!(Level::DEBUG, state = %*state, "Stop requested on a flow that is not started; ignoring.");
      return Ok(());
    }

    if let Some(source) = self.source.as_ref().filter(|_| self.starts_message_source()) {
      lifecycle::apply_phase_safely(&self.name, source.name(), source.lifecycle(), LifecyclePhase::Stop);
    }
    let runtime = self.runtime();
    if let Some(rt) = &runtime {
      rt.accepting.store(false, Ordering::Release);
    }

    {
      let overlay = self.overlay.lock();
      lifecycle::stop_in_reverse(&self.name, &self.lifecycle_members(&overlay, false));
    }

    if let Some(pool) = runtime.as_ref().and_then(|rt| rt.pool.as_ref()) {
      pool.stop();
    }
    *state = LifecycleState::Stopped;
    event!(Level::INFO, "Flow stopped.");
    Ok(())
  }

  /// Disposes every component in reverse order, best-effort. Only valid on an
  /// initialised or stopped flow.
  #[instrument(name = "Flow::dispose", skip_all, fields(flow = %self.name), err(Display))]
  pub fn dispose(&self) -> FlowResult<()> {
    let mut state = self.state.lock();
    match *state {
      LifecycleState::Initialised | LifecycleState::Stopped => {}
      other => {
        return Err(FlowError::illegal_state(
          &self.name,
          format!("cannot dispose a flow that is {}", other),
        ))
      }
    }

    {
      let mut overlay = self.overlay.lock();
      lifecycle::dispose_in_reverse(&self.name, &self.lifecycle_members(&overlay, true));
      *overlay = OverlayState::default();
    }
    if let Some(runtime) = self.runtime.write().take() {
      if let Some(pool) = &runtime.pool {
        pool.stop();
      }
    }
    self.paths.invalidate();

    *state = LifecycleState::Disposed;
    event!(Level::INFO, "Flow disposed.");
    Ok(())
  }

  /// Processors currently injected by a dynamic pipeline, before and after the
  /// static chain.
  pub fn overlay_processors(&self) -> (Vec<Arc<dyn Processor>>, Vec<Arc<dyn Processor>>) {
    let overlay = self.overlay.lock();
    (overlay.before.clone(), overlay.after.clone())
  }
}
