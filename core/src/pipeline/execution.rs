// esbflow/src/pipeline/execution.rs

//! Contains `Flow::process()` and the shared runtime that executes events
//! according to the flow's processing strategy.

use crate::chain::ProcessorChain;
use crate::core::event::Event;
use crate::core::exception::ExceptionListener;
use crate::core::source::MessageSource;
use crate::error::{FlowError, FlowResult};
use crate::pipeline::definition::Flow;
use crate::strategy::pool::AsyncWorkerPool;
use crate::strategy::ProcessingStrategy;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{event, instrument, Level};

/// The part of a flow shared with its source listener and with queued work.
///
/// Created by `Flow::initialise()`. The effective chain is the only piece of
/// state written while traffic flows; it is replaced wholesale and every
/// dispatch reads it exactly once.
pub(crate) struct FlowRuntime {
  pub(crate) name: String,
  pub(crate) strategy: ProcessingStrategy,
  pub(crate) static_chain: Arc<ProcessorChain>,
  pub(crate) effective_chain: ArcSwap<ProcessorChain>,
  pub(crate) exception_listener: Arc<dyn ExceptionListener>,
  pub(crate) source: Option<Arc<dyn MessageSource>>,
  pub(crate) pool: Option<AsyncWorkerPool>,
  pub(crate) accepting: AtomicBool,
}

impl FlowRuntime {
  pub(crate) fn new(
    name: String,
    strategy: ProcessingStrategy,
    static_chain: Arc<ProcessorChain>,
    exception_listener: Arc<dyn ExceptionListener>,
    source: Option<Arc<dyn MessageSource>>,
    pool: Option<AsyncWorkerPool>,
  ) -> Self {
    Self {
      effective_chain: ArcSwap::new(Arc::clone(&static_chain)),
      name,
      strategy,
      static_chain,
      exception_listener,
      source,
      pool,
      accepting: AtomicBool::new(false),
    }
  }

  pub(crate) fn publish_chain(&self, chain: Arc<ProcessorChain>) {
    self.effective_chain.store(chain);
  }

  pub(crate) fn effective_chain(&self) -> Arc<ProcessorChain> {
    self.effective_chain.load_full()
  }

  fn ensure_accepting(&self) -> FlowResult<()> {
    if self.accepting.load(Ordering::Acquire) {
      Ok(())
    } else {
      Err(FlowError::NotStarted {
        flow: self.name.clone(),
      })
    }
  }

  /// Runs the chain and hands a failure to the exception listener.
  async fn execute(&self, chain: Arc<ProcessorChain>, event: Event) -> FlowResult<Option<Event>> {
    let inbound = event.clone();
    match chain.run(event).await {
      Ok(result) => Ok(Some(result)),
      Err(error) => {
        event!(Level::DEBUG, flow = %self.name, error = %error, "Chain failed; delegating to exception listener.");
        self.exception_listener.handle_exception(&self.name, error, inbound).await
      }
    }
  }

  /// Dispatches a call that waits for the outcome.
  pub(crate) async fn dispatch(self: &Arc<Self>, event: Event) -> FlowResult<Option<Event>> {
    self.ensure_accepting()?;
    let chain = self.effective_chain();
    match self.strategy {
      ProcessingStrategy::Synchronous => self.execute(chain, event).await,
      ProcessingStrategy::Default if !event.is_one_way() => self.execute(chain, event).await,
      ProcessingStrategy::Default | ProcessingStrategy::Asynchronous(_) => {
        self.hand_off(chain, event).await?;
        Ok(None)
      }
      ProcessingStrategy::NonBlocking => self.execute_detached(chain, event).await,
    }
  }

  /// Dispatches an event pushed by the flow's own source. Under the
  /// non-blocking strategy the outcome goes to the source's reply callback and
  /// the call returns `Ok(None)` at once.
  pub(crate) async fn dispatch_from_source(self: &Arc<Self>, event: Event) -> FlowResult<Option<Event>> {
    if !self.strategy.is_non_blocking() {
      return self.dispatch(event).await;
    }
    self.ensure_accepting()?;
    let chain = self.effective_chain();
    let runtime = self.spawn_handle()?;
    let this = Arc::clone(self);
    runtime.spawn(async move {
      let result = this.execute(chain, event).await;
      match this.source.as_ref().and_then(|s| s.as_non_blocking()) {
        Some(reply_to) => reply_to.reply(result),
        None => {
          if let Err(e) = result {
            event!(Level::ERROR, flow = %this.name, error = %e, "Non-blocking dispatch failed with no reply handler.");
          }
        }
      }
    });
    Ok(None)
  }

  async fn hand_off(self: &Arc<Self>, chain: Arc<ProcessorChain>, event: Event) -> FlowResult<()> {
    let pool = self.pool.as_ref().ok_or_else(|| FlowError::Dispatch {
      flow: self.name.clone(),
      message: "no worker pool configured for asynchronous processing".to_string(),
    })?;
    let this = Arc::clone(self);
    pool
      .submit(Box::pin(async move {
        if let Err(e) = this.execute(chain, event).await {
          event!(Level::WARN, flow = %this.name, error = %e, "Asynchronous processing failed; no caller to report to.");
        }
      }))
      .await
  }

  // Runs the chain on its own task so it can resume on any runtime thread
  // without holding the caller's.
  async fn execute_detached(self: &Arc<Self>, chain: Arc<ProcessorChain>, event: Event) -> FlowResult<Option<Event>> {
    let runtime = self.spawn_handle()?;
    let this = Arc::clone(self);
    runtime
      .spawn(async move { this.execute(chain, event).await })
      .await
      .map_err(|e| FlowError::Internal(format!("non-blocking task for flow '{}' failed: {}", self.name, e)))?
  }

  fn spawn_handle(&self) -> FlowResult<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().map_err(|e| FlowError::Dispatch {
      flow: self.name.clone(),
      message: format!("non-blocking processing requires a tokio runtime: {}", e),
    })
  }
}

/// The handle a flow installs on its message source.
///
/// It keeps only a weak reference to the flow, so a source that outlives its
/// flow gets `NotStarted` instead of keeping the flow alive.
#[derive(Clone)]
pub struct FlowListener {
  flow_name: String,
  runtime: Weak<FlowRuntime>,
}

impl FlowListener {
  pub(crate) fn new(runtime: &Arc<FlowRuntime>) -> Self {
    Self {
      flow_name: runtime.name.clone(),
      runtime: Arc::downgrade(runtime),
    }
  }

  pub fn flow_name(&self) -> &str {
    &self.flow_name
  }

  /// Delivers an inbound event to the flow.
  ///
  /// Returns the response for synchronous execution, or `None` when the event
  /// was handed off (asynchronous) or will be answered through
  /// `NonBlockingMessageSource::reply` (non-blocking).
  pub async fn on_event(&self, event: Event) -> FlowResult<Option<Event>> {
    let runtime = self.runtime.upgrade().ok_or_else(|| FlowError::NotStarted {
      flow: self.flow_name.clone(),
    })?;
    runtime.dispatch_from_source(event).await
  }
}

impl std::fmt::Debug for FlowListener {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FlowListener").field("flow_name", &self.flow_name).finish()
  }
}

impl Flow {
  /// Processes `event` through the flow.
  ///
  /// The effective chain (static, or overlaid by a dynamic pipeline) is
  /// snapshotted once at the start of the call. Returns `Ok(Some(_))` with the
  /// response, or `Ok(None)` when the event was handed off without a response.
  #[instrument(
        name = "Flow::process",
        skip_all,
        fields(flow = %self.name, strategy = tracing::field::Empty),
        err(Display)
    )]
  pub async fn process(&self, event: Event) -> FlowResult<Option<Event>> {
    let runtime = self.runtime().ok_or_else(|| FlowError::NotStarted {
      flow: self.name.clone(),
    })?;
    tracing::Span::current().record("strategy", tracing::field::display(&runtime.strategy));
    runtime.dispatch(event).await
  }

  /// The chain `process` currently runs, or `None` before initialisation.
  pub fn effective_chain(&self) -> Option<Arc<ProcessorChain>> {
    self.runtime().map(|rt| rt.effective_chain())
  }

  /// Closes the worker pool and waits for queued work to finish. The flow is
  /// left as `stop()` would leave it.
  pub async fn drain(&self) -> FlowResult<()> {
    self.stop()?;
    let runtime = self.runtime();
    if let Some(pool) = runtime.as_ref().and_then(|rt| rt.pool.as_ref()) {
      pool.drain().await;
    }
    Ok(())
  }
}
