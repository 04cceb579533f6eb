// esbflow/src/chain/response.rs

//! Adapter that moves a processor into the response phase of a chain.

use crate::core::event::Event;
use crate::core::lifecycle::Lifecycle;
use crate::core::processor::{PathContainer, Processor, ResponsePhase};
use crate::error::FlowResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Passes the request through untouched and applies the wrapped processor to
/// the event returned by the rest of the chain.
pub struct ResponseMessageProcessorAdapter {
  name: String,
  response_processor: Arc<dyn Processor>,
}

impl ResponseMessageProcessorAdapter {
  pub fn new(response_processor: Arc<dyn Processor>) -> Self {
    Self {
      name: format!("response({})", response_processor.name()),
      response_processor,
    }
  }

  pub fn response_processor(&self) -> &Arc<dyn Processor> {
    &self.response_processor
  }
}

#[async_trait]
impl Processor for ResponseMessageProcessorAdapter {
  async fn process(&self, event: Event) -> FlowResult<Event> {
    Ok(event)
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn lifecycle(&self) -> Option<&dyn Lifecycle> {
    self.response_processor.lifecycle()
  }

  fn path_container(&self) -> Option<&dyn PathContainer> {
    self.response_processor.path_container()
  }

  fn response_phase(&self) -> Option<&dyn ResponsePhase> {
    Some(self)
  }
}

#[async_trait]
impl ResponsePhase for ResponseMessageProcessorAdapter {
  async fn process_response(&self, event: Event) -> FlowResult<Event> {
    self.response_processor.process(event).await
  }
}
