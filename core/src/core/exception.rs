// esbflow/src/core/exception.rs

//! Exception listeners: the policy a flow delegates processing failures to.

use crate::chain::ProcessorChain;
use crate::core::event::Event;
use crate::core::lifecycle::Lifecycle;
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use tracing::{event, Level};

/// Handles an error raised while a flow processed `event`.
///
/// `event` is the event as it entered the flow. Returning `Ok(Some(_))` recovers
/// with a response, `Ok(None)` swallows the failure without a response, and
/// `Err(_)` propagates an error to the caller.
#[async_trait]
pub trait ExceptionListener: Send + Sync {
  async fn handle_exception(&self, flow_name: &str, error: FlowError, event: Event) -> FlowResult<Option<Event>>;

  fn lifecycle(&self) -> Option<&dyn Lifecycle> {
    None
  }
}

/// Logs the failure and propagates it unchanged. Used when a flow has no
/// exception listener configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionListener;

#[async_trait]
impl ExceptionListener for LoggingExceptionListener {
  async fn handle_exception(&self, flow_name: &str, error: FlowError, _event: Event) -> FlowResult<Option<Event>> {
    event!(Level::ERROR, flow = %flow_name, error = %error, "Unhandled exception in flow.");
    Err(error)
  }
}

/// Logs the failure, then runs the inbound event through a recovery chain and
/// answers with its result. The original error is not propagated.
pub struct CatchExceptionListener {
  recovery: ProcessorChain,
}

impl CatchExceptionListener {
  pub fn new(recovery: ProcessorChain) -> Self {
    Self { recovery }
  }
}

#[async_trait]
impl ExceptionListener for CatchExceptionListener {
  async fn handle_exception(&self, flow_name: &str, error: FlowError, event: Event) -> FlowResult<Option<Event>> {
    event!(Level::WARN, flow = %flow_name, error = %error, "Exception caught; running recovery chain.");
    let recovered = self.recovery.run(event).await?;
    Ok(Some(recovered))
  }

  fn lifecycle(&self) -> Option<&dyn Lifecycle> {
    Some(&self.recovery)
  }
}
