// esbflow/src/strategy/pool.rs

//! Bounded worker pool used for asynchronous hand-off.

use crate::error::{FlowError, FlowResult};
use crate::strategy::definition::AsyncSettings;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{event, span, Instrument, Level};

/// A unit of queued work. The future already captures the event and the chain
/// snapshot taken when the event was dispatched.
pub(crate) type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>;

/// A fixed number of worker tasks draining a bounded queue.
///
/// Submitting waits while the queue is full. Stopping closes the queue: workers
/// finish what is already queued and then exit.
pub struct AsyncWorkerPool {
  owner: String,
  settings: AsyncSettings,
  sender: Mutex<Option<mpsc::Sender<Job>>>,
  workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncWorkerPool {
  pub fn new(owner: impl Into<String>, settings: AsyncSettings) -> Self {
    Self {
      owner: owner.into(),
      settings,
      sender: Mutex::new(None),
      workers: Mutex::new(Vec::new()),
    }
  }

  pub fn settings(&self) -> AsyncSettings {
    self.settings
  }

  pub fn is_running(&self) -> bool {
    self.sender.lock().is_some()
  }

  /// Spawns the workers on the current tokio runtime. `stage_name` labels each
  /// worker. Starting a running pool is a no-op.
  pub fn start(&self, mut stage_name: impl FnMut() -> String) -> FlowResult<()> {
    let mut sender_slot = self.sender.lock();
    if sender_slot.is_some() {
      return Ok(());
    }

    let runtime = tokio::runtime::Handle::try_current().map_err(|e| FlowError::Dispatch {
      flow: self.owner.clone(),
      message: format!("asynchronous processing requires a tokio runtime: {}", e),
    })?;

    let (tx, rx) = mpsc::channel::<Job>(self.settings.queue_capacity);
    let shared_rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = self.workers.lock();
    // Workers of an earlier run exit once their closed queue is drained.
    workers.retain(|worker| !worker.is_finished());
    for _ in 0..self.settings.max_workers {
      let stage = stage_name();
      let worker_span = span!(Level::DEBUG, "async_worker", flow = %self.owner, stage = %stage);
      workers.push(runtime.spawn(worker_loop(Arc::clone(&shared_rx)).instrument(worker_span)));
    }
    *sender_slot = Some(tx);

    event!(
      Level::DEBUG,
      flow = %self.owner,
      workers = self.settings.max_workers,
      queue_capacity = self.settings.queue_capacity,
      "Worker pool started."
    );
    Ok(())
  }

  /// Worker tasks spawned by this pool that have not been reaped yet.
  pub(crate) fn worker_count(&self) -> usize {
    self.workers.lock().len()
  }

  pub(crate) fn live_workers(&self) -> usize {
    self.workers.lock().iter().filter(|worker| !worker.is_finished()).count()
  }

  /// Queues `job`, waiting for room if the queue is full.
  pub(crate) async fn submit(&self, job: Job) -> FlowResult<()> {
    let sender = self.sender.lock().clone().ok_or_else(|| FlowError::Dispatch {
      flow: self.owner.clone(),
      message: "the worker pool is not running".to_string(),
    })?;
    sender.send(job).await.map_err(|_| FlowError::Dispatch {
      flow: self.owner.clone(),
      message: "the worker pool queue is closed".to_string(),
    })
  }

  /// Closes the queue. Workers exit once it is drained.
  pub fn stop(&self) {
    if self.sender.lock().take().is_some() {
      event!(Level::DEBUG, flow = %self.owner, "Worker pool queue closed.");
    }
  }

  /// Closes the queue and waits until every worker has exited.
  pub async fn drain(&self) {
    self.stop();
    let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
    for worker in workers {
      if let Err(e) = worker.await {
        event!(Level::WARN, flow = %self.owner, error = %e, "Worker task ended abnormally.");
      }
    }
  }
}

async fn worker_loop(rx: SharedReceiver) {
  loop {
    let next = {
      let mut guard = rx.lock().await;
      guard.recv().await
    };
    let Some(job) = next else {
      event!(Level::TRACE, "Queue closed; worker exiting.");
      break;
    };
    // A panicking job must not take the worker down with it.
    if let Err(e) = tokio::spawn(job).await {
      event!(Level::ERROR, error = %e, "Queued job panicked.");
    }
  }
}
