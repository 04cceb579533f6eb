// esbflow/src/core/processor.rs

//! The `Processor` contract and the optional capabilities a processor may expose.

use crate::core::event::Event;
use crate::core::lifecycle::Lifecycle;
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A unit of work applied to every event passing through a chain.
///
/// Processor identity is reference identity: two `Arc`s pointing at the same
/// processor are the same processor for path lookups.
///
/// Capabilities are reported through accessors that default to `None`:
/// - `lifecycle()` for processors with initialise/start/stop/dispose hooks,
/// - `path_container()` for processors that privately manage nested processors,
/// - `response_phase()` for processors that act on the downstream response.
#[async_trait]
pub trait Processor: Send + Sync {
  async fn process(&self, event: Event) -> FlowResult<Event>;

  /// Name used in logs and lifecycle errors.
  fn name(&self) -> &str {
    std::any::type_name::<Self>()
  }

  fn lifecycle(&self) -> Option<&dyn Lifecycle> {
    None
  }

  fn path_container(&self) -> Option<&dyn PathContainer> {
    None
  }

  fn response_phase(&self) -> Option<&dyn ResponsePhase> {
    None
  }
}

/// Logic a processor applies to the event coming back up the chain once every
/// downstream processor has completed.
#[async_trait]
pub trait ResponsePhase: Send + Sync {
  async fn process_response(&self, event: Event) -> FlowResult<Event>;
}

/// A processor that manages nested processors of its own and can report their
/// fully-qualified paths, e.g. `/sub/subprocessors/0`.
///
/// Building the map may be expensive; a flow asks each container at most once
/// per topology and caches the answer.
pub trait PathContainer: Send + Sync {
  fn inner_paths(&self) -> Vec<(Arc<dyn Processor>, String)>;
}

/// Identity key of a processor: the address of the object behind the trait object.
pub(crate) fn processor_key(processor: &dyn Processor) -> usize {
  processor as *const dyn Processor as *const () as usize
}

/// Type alias for the boxed async closure wrapped by `FnProcessor`.
pub type ProcessFn = Box<dyn Fn(Event) -> Pin<Box<dyn Future<Output = FlowResult<Event>> + Send>> + Send + Sync>;

/// A processor backed by an async closure.
pub struct FnProcessor {
  name: String,
  process_fn: ProcessFn,
}

impl FnProcessor {
  pub fn new<F, Fut, E>(name: impl Into<String>, f: F) -> Self
  where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Event, E>> + Send + 'static,
    E: Into<FlowError> + Send + 'static,
  {
    let process_fn: ProcessFn = Box::new(move |event| {
      let user_fut = f(event);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    Self {
      name: name.into(),
      process_fn,
    }
  }
}

#[async_trait]
impl Processor for FnProcessor {
  async fn process(&self, event: Event) -> FlowResult<Event> {
    (self.process_fn)(event).await
  }

  fn name(&self) -> &str {
    &self.name
  }
}

/// Wraps an async closure into a shareable processor.
pub fn from_fn<F, Fut, E>(name: impl Into<String>, f: F) -> Arc<dyn Processor>
where
  F: Fn(Event) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Event, E>> + Send + 'static,
  E: Into<FlowError> + Send + 'static,
{
  Arc::new(FnProcessor::new(name, f))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn fn_processor_maps_user_errors() {
    let failing = from_fn("failing", |_event: Event| async move { Err::<Event, _>(anyhow::anyhow!("boom")) });
    let err = failing.process(Event::new("x")).await.unwrap_err();
    assert!(matches!(err, FlowError::Processing { .. }));
    assert_eq!(failing.name(), "failing");
  }

  #[test]
  fn processor_key_follows_reference_identity() {
    let a = from_fn("a", |e: Event| async move { Ok::<_, FlowError>(e) });
    let b = from_fn("a", |e: Event| async move { Ok::<_, FlowError>(e) });
    let a_again = a.clone();
    assert_eq!(processor_key(a.as_ref()), processor_key(a_again.as_ref()));
    assert_ne!(processor_key(a.as_ref()), processor_key(b.as_ref()));
  }
}
