// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use esbflow::{
  from_fn, Event, FlowError, FlowListener, FlowResult, Lifecycle, LifecyclePhase, MessageSource,
  NonBlockingMessageSource, PathContainer, Processor, RedeliveryPolicy,
};
use parking_lot::Mutex;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Level;

// --- Common Processor Creators ---

/// Appends `suffix` to the payload.
pub fn appender(suffix: &'static str) -> Arc<dyn Processor> {
  from_fn(format!("append-{}", suffix), move |event: Event| async move {
    tracing::debug!(target: "test_processors", suffix, "appending");
    Ok::<_, FlowError>(event.append_payload(suffix))
  })
}

/// Fails every event with `message`.
pub fn failing_processor(message: &'static str) -> Arc<dyn Processor> {
  from_fn("failing", move |_event: Event| async move { Err::<Event, _>(anyhow::anyhow!(message)) })
}

/// Counts the events it sees and passes them through.
pub fn counting_processor(counter: Arc<AtomicUsize>) -> Arc<dyn Processor> {
  from_fn("counting", move |event: Event| {
    let counter = Arc::clone(&counter);
    async move {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok::<_, FlowError>(event)
    }
  })
}

/// Waits for a permit on `gate` before passing the event on. Tracks how many
/// events are inside at once in `active`, keeping the peak in `peak`.
pub fn gated_processor(gate: Arc<tokio::sync::Semaphore>, active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Arc<dyn Processor> {
  from_fn("gated", move |event: Event| {
    let gate = Arc::clone(&gate);
    let active = Arc::clone(&active);
    let peak = Arc::clone(&peak);
    async move {
      let now = active.fetch_add(1, Ordering::SeqCst) + 1;
      peak.fetch_max(now, Ordering::SeqCst);
      let permit = gate.acquire().await;
      active.fetch_sub(1, Ordering::SeqCst);
      drop(permit);
      Ok::<_, FlowError>(event)
    }
  })
}

// --- Lifecycle tracking ---

/// Shared, ordered record of lifecycle calls, e.g. `"p1:start"`.
#[derive(Clone, Default)]
pub struct LifecycleLog(Arc<Mutex<Vec<String>>>);

impl LifecycleLog {
  pub fn record(&self, entry: String) {
    self.0.lock().push(entry);
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().clone()
  }

  pub fn count(&self, entry: &str) -> usize {
    self.0.lock().iter().filter(|e| e.as_str() == entry).count()
  }

  pub fn clear(&self) {
    self.0.lock().clear();
  }
}

fn phase_label(phase: LifecyclePhase) -> &'static str {
  match phase {
    LifecyclePhase::Initialise => "initialise",
    LifecyclePhase::Start => "start",
    LifecyclePhase::Stop => "stop",
    LifecyclePhase::Dispose => "dispose",
  }
}

fn track(name: &str, log: &LifecycleLog, fail_on: Option<LifecyclePhase>, phase: LifecyclePhase) -> FlowResult<()> {
  log.record(format!("{}:{}", name, phase_label(phase)));
  if fail_on == Some(phase) {
    return Err(FlowError::lifecycle(
      name,
      phase,
      anyhow::anyhow!("{} refused to {}", name, phase_label(phase)),
    ));
  }
  Ok(())
}

/// A processor that appends its suffix and records every lifecycle call.
pub struct TrackedProcessor {
  name: String,
  suffix: String,
  log: LifecycleLog,
  fail_on: Option<LifecyclePhase>,
}

impl TrackedProcessor {
  pub fn new(name: &str, log: &LifecycleLog) -> Self {
    Self {
      name: name.to_string(),
      suffix: name.to_string(),
      log: log.clone(),
      fail_on: None,
    }
  }

  pub fn failing_on(mut self, phase: LifecyclePhase) -> Self {
    self.fail_on = Some(phase);
    self
  }

  pub fn shared(self) -> Arc<dyn Processor> {
    Arc::new(self)
  }
}

#[async_trait]
impl Processor for TrackedProcessor {
  async fn process(&self, event: Event) -> FlowResult<Event> {
    Ok(event.append_payload(&self.suffix))
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn lifecycle(&self) -> Option<&dyn Lifecycle> {
    Some(self)
  }
}

impl Lifecycle for TrackedProcessor {
  fn initialise(&self) -> FlowResult<()> {
    track(&self.name, &self.log, self.fail_on, LifecyclePhase::Initialise)
  }

  fn start(&self) -> FlowResult<()> {
    track(&self.name, &self.log, self.fail_on, LifecyclePhase::Start)
  }

  fn stop(&self) -> FlowResult<()> {
    track(&self.name, &self.log, self.fail_on, LifecyclePhase::Stop)
  }

  fn dispose(&self) -> FlowResult<()> {
    track(&self.name, &self.log, self.fail_on, LifecyclePhase::Dispose)
  }
}

// --- Message sources ---

/// A configurable message source: optionally non-blocking, optionally with a
/// redelivery policy, optionally failing a lifecycle phase.
pub struct TestSource {
  name: String,
  log: LifecycleLog,
  fail_on: Option<LifecyclePhase>,
  non_blocking: bool,
  redelivery: Option<RedeliveryPolicy>,
  listener: Mutex<Option<FlowListener>>,
  reply_tx: mpsc::UnboundedSender<FlowResult<Option<Event>>>,
  reply_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<FlowResult<Option<Event>>>>,
}

impl TestSource {
  pub fn new(name: &str, log: &LifecycleLog) -> Self {
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    Self {
      name: name.to_string(),
      log: log.clone(),
      fail_on: None,
      non_blocking: false,
      redelivery: None,
      listener: Mutex::new(None),
      reply_tx,
      reply_rx: tokio::sync::Mutex::new(reply_rx),
    }
  }

  pub fn plain() -> Self {
    Self::new("source", &LifecycleLog::default())
  }

  pub fn non_blocking(mut self) -> Self {
    self.non_blocking = true;
    self
  }

  pub fn with_redelivery(mut self) -> Self {
    self.redelivery = Some(RedeliveryPolicy::default());
    self
  }

  pub fn failing_on(mut self, phase: LifecyclePhase) -> Self {
    self.fail_on = Some(phase);
    self
  }

  pub fn has_listener(&self) -> bool {
    self.listener.lock().is_some()
  }

  /// Pushes an inbound event into the flow through the installed listener.
  pub async fn push(&self, event: Event) -> FlowResult<Option<Event>> {
    let listener = self
      .listener
      .lock()
      .clone()
      .ok_or_else(|| FlowError::Internal("no listener installed".to_string()))?;
    listener.on_event(event).await
  }

  /// Waits for the next out-of-band reply.
  pub async fn next_reply(&self) -> FlowResult<Option<Event>> {
    let mut rx = self.reply_rx.lock().await;
    match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
      Ok(Some(reply)) => reply,
      Ok(None) => Err(FlowError::Internal("reply channel closed".to_string())),
      Err(_) => Err(FlowError::Internal("timed out waiting for a reply".to_string())),
    }
  }
}

impl MessageSource for TestSource {
  fn set_listener(&self, listener: FlowListener) {
    *self.listener.lock() = Some(listener);
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn lifecycle(&self) -> Option<&dyn Lifecycle> {
    Some(self)
  }

  fn as_non_blocking(&self) -> Option<&dyn NonBlockingMessageSource> {
    if self.non_blocking {
      Some(self)
    } else {
      None
    }
  }

  fn redelivery_policy(&self) -> Option<RedeliveryPolicy> {
    self.redelivery
  }
}

impl NonBlockingMessageSource for TestSource {
  fn reply(&self, result: FlowResult<Option<Event>>) {
    let _ = self.reply_tx.send(result);
  }
}

impl Lifecycle for TestSource {
  fn initialise(&self) -> FlowResult<()> {
    track(&self.name, &self.log, self.fail_on, LifecyclePhase::Initialise)
  }

  fn start(&self) -> FlowResult<()> {
    track(&self.name, &self.log, self.fail_on, LifecyclePhase::Start)
  }

  fn stop(&self) -> FlowResult<()> {
    track(&self.name, &self.log, self.fail_on, LifecyclePhase::Stop)
  }

  fn dispose(&self) -> FlowResult<()> {
    track(&self.name, &self.log, self.fail_on, LifecyclePhase::Dispose)
  }
}

// --- Path containers ---

/// A pass-through processor that privately manages one inner processor and
/// counts how often its inner paths are requested.
pub struct CountingContainer {
  inner: Arc<dyn Processor>,
  inner_path: String,
  builds: Arc<AtomicUsize>,
}

impl CountingContainer {
  pub fn new(inner: Arc<dyn Processor>, inner_path: &str, builds: Arc<AtomicUsize>) -> Self {
    Self {
      inner,
      inner_path: inner_path.to_string(),
      builds,
    }
  }
}

#[async_trait]
impl Processor for CountingContainer {
  async fn process(&self, event: Event) -> FlowResult<Event> {
    self.inner.process(event).await
  }

  fn name(&self) -> &str {
    "counting-container"
  }

  fn path_container(&self) -> Option<&dyn PathContainer> {
    Some(self)
  }
}

impl PathContainer for CountingContainer {
  fn inner_paths(&self) -> Vec<(Arc<dyn Processor>, String)> {
    self.builds.fetch_add(1, Ordering::SeqCst);
    vec![(Arc::clone(&self.inner), self.inner_path.clone())]
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
