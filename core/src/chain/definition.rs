// esbflow/src/chain/definition.rs

//! The immutable `ProcessorChain` and its builder.

use crate::core::event::Event;
use crate::core::lifecycle::{self, Lifecycle, LifecycleMember};
use crate::core::processor::{PathContainer, Processor, ResponsePhase};
use crate::error::FlowResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{event, Level};

/// An ordered, immutable sequence of processors.
///
/// Running a chain hands the event to each processor in registration order.
/// The first failure short-circuits the rest of the chain. Processors exposing a
/// response phase are unwound after the forward pass, last registered first,
/// the same way nested decorators would unwind.
pub struct ProcessorChain {
  name: String,
  processors: Vec<Arc<dyn Processor>>,
  path_prefix: Option<String>,
}

impl ProcessorChain {
  pub fn new(name: impl Into<String>, processors: Vec<Arc<dyn Processor>>) -> Self {
    Self {
      name: name.into(),
      processors,
      path_prefix: None,
    }
  }

  pub fn builder(name: impl Into<String>) -> ProcessorChainBuilder {
    ProcessorChainBuilder::new(name)
  }

  /// Makes the chain report its members as `<prefix>/<index>` when a flow
  /// resolves processor paths through it.
  pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.path_prefix = Some(prefix.into());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn processors(&self) -> &[Arc<dyn Processor>] {
    &self.processors
  }

  pub fn len(&self) -> usize {
    self.processors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.processors.is_empty()
  }

  /// Runs `event` through every processor of the chain.
  pub async fn run(&self, event: Event) -> FlowResult<Event> {
    let mut pending_responses: Vec<&dyn ResponsePhase> = Vec::new();
    let mut current = event;

    for (idx, processor) in self.processors.iter().enumerate() {
      event!(Level::TRACE, chain = %self.name, processor_index = idx, processor = %processor.name(), "Invoking processor.");
      current = match processor.process(current).await {
        Ok(next) => next,
        Err(e) => {
          event!(Level::DEBUG, chain = %self.name, processor_index = idx, error = %e, "Processor failed; short-circuiting chain.");
          return Err(e);
        }
      };
      if let Some(response_phase) = processor.response_phase() {
        pending_responses.push(response_phase);
      }
    }

    while let Some(response_phase) = pending_responses.pop() {
      current = response_phase.process_response(current).await?;
    }
    Ok(current)
  }

  fn members(&self) -> Vec<LifecycleMember<'_>> {
    self.processors.iter().map(|p| (p.name(), p.lifecycle())).collect()
  }
}

#[async_trait]
impl Processor for ProcessorChain {
  async fn process(&self, event: Event) -> FlowResult<Event> {
    self.run(event).await
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn lifecycle(&self) -> Option<&dyn Lifecycle> {
    Some(self)
  }

  fn path_container(&self) -> Option<&dyn PathContainer> {
    self.path_prefix.as_ref().map(|_| self as &dyn PathContainer)
  }
}

impl Lifecycle for ProcessorChain {
  fn initialise(&self) -> FlowResult<()> {
    lifecycle::initialise_in_order(&self.name, &self.members())
  }

  fn start(&self) -> FlowResult<()> {
    lifecycle::start_in_order(&self.name, &self.members())
  }

  fn stop(&self) -> FlowResult<()> {
    lifecycle::stop_in_reverse(&self.name, &self.members());
    Ok(())
  }

  fn dispose(&self) -> FlowResult<()> {
    lifecycle::dispose_in_reverse(&self.name, &self.members());
    Ok(())
  }
}

impl PathContainer for ProcessorChain {
  fn inner_paths(&self) -> Vec<(Arc<dyn Processor>, String)> {
    let Some(prefix) = &self.path_prefix else {
      return Vec::new();
    };
    let mut paths = Vec::with_capacity(self.processors.len());
    for (idx, processor) in self.processors.iter().enumerate() {
      paths.push((processor.clone(), format!("{}/{}", prefix, idx)));
      if let Some(nested) = processor.path_container() {
        paths.extend(nested.inner_paths());
      }
    }
    paths
  }
}

impl std::fmt::Debug for ProcessorChain {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProcessorChain")
      .field("name", &self.name)
      .field("processors", &self.processors.iter().map(|p| p.name()).collect::<Vec<_>>())
      .field("path_prefix", &self.path_prefix)
      .finish()
  }
}

/// Fluent builder for `ProcessorChain`.
pub struct ProcessorChainBuilder {
  name: String,
  processors: Vec<Arc<dyn Processor>>,
  path_prefix: Option<String>,
}

impl ProcessorChainBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      processors: Vec::new(),
      path_prefix: None,
    }
  }

  pub fn chain(mut self, processor: Arc<dyn Processor>) -> Self {
    self.processors.push(processor);
    self
  }

  pub fn chain_all(mut self, processors: impl IntoIterator<Item = Arc<dyn Processor>>) -> Self {
    self.processors.extend(processors);
    self
  }

  pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.path_prefix = Some(prefix.into());
    self
  }

  pub fn build(self) -> ProcessorChain {
    ProcessorChain {
      name: self.name,
      processors: self.processors,
      path_prefix: self.path_prefix,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chain::ResponseMessageProcessorAdapter;
  use crate::core::processor::from_fn;
  use crate::error::FlowError;

  fn appender(suffix: &'static str) -> Arc<dyn Processor> {
    from_fn(suffix, move |event: Event| async move { Ok::<_, FlowError>(event.append_payload(suffix)) })
  }

  #[tokio::test]
  async fn runs_processors_in_registration_order() {
    let chain = ProcessorChain::builder("abc")
      .chain(appender("a"))
      .chain(appender("b"))
      .chain(appender("c"))
      .build();
    let result = chain.run(Event::new("0")).await.unwrap();
    assert_eq!(result.payload(), "0abc");
  }

  #[tokio::test]
  async fn response_adapters_unwind_in_reverse_registration_order() {
    let chain = ProcessorChain::builder("adapters")
      .chain(Arc::new(ResponseMessageProcessorAdapter::new(appender("f"))))
      .chain(Arc::new(ResponseMessageProcessorAdapter::new(appender("e"))))
      .chain(Arc::new(ResponseMessageProcessorAdapter::new(appender("d"))))
      .chain(appender("a"))
      .chain(appender("b"))
      .chain(appender("c"))
      .build();
    let result = chain.run(Event::new("0")).await.unwrap();
    assert_eq!(result.payload(), "0abcdef");
  }

  #[tokio::test]
  async fn failure_skips_remaining_processors_and_response_phases() {
    let failing = from_fn("failing", |_event: Event| async move { Err::<Event, _>(anyhow::anyhow!("bad")) });
    let chain = ProcessorChain::builder("failing")
      .chain(Arc::new(ResponseMessageProcessorAdapter::new(appender("r"))))
      .chain(appender("a"))
      .chain(failing)
      .chain(appender("never"))
      .build();
    let err = chain.run(Event::new("0")).await.unwrap_err();
    assert!(err.to_string().contains("bad"));
  }

  #[test]
  fn path_prefix_enables_container_capability() {
    let plain = ProcessorChain::new("plain", vec![appender("a")]);
    assert!(Processor::path_container(&plain).is_none());

    let inner = appender("a");
    let sub = ProcessorChain::new("sub", vec![inner.clone()]).with_path_prefix("/sub/subprocessors");
    let container = Processor::path_container(&sub).expect("prefixed chain is a container");
    let paths = container.inner_paths();
    assert_eq!(paths.len(), 1);
    assert!(Arc::ptr_eq(&paths[0].0, &inner));
    assert_eq!(paths[0].1, "/sub/subprocessors/0");
  }
}
