// esbflow/src/core/source.rs

//! The inbound side of a flow: message sources and their optional capabilities.

use crate::core::event::Event;
use crate::core::lifecycle::Lifecycle;
use crate::error::FlowResult;
use crate::pipeline::execution::FlowListener;

/// Retry-counting policy configured on the inbound side of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
  pub max_redelivery_count: u32,
}

impl RedeliveryPolicy {
  pub fn new(max_redelivery_count: u32) -> Self {
    Self { max_redelivery_count }
  }
}

impl Default for RedeliveryPolicy {
  fn default() -> Self {
    Self { max_redelivery_count: 5 }
  }
}

/// Something that originates events into a flow.
///
/// A flow installs a `FlowListener` on its source during initialisation; the
/// source pushes each inbound event through `FlowListener::on_event`.
pub trait MessageSource: Send + Sync {
  fn set_listener(&self, listener: FlowListener);

  fn name(&self) -> &str {
    std::any::type_name::<Self>()
  }

  fn lifecycle(&self) -> Option<&dyn Lifecycle> {
    None
  }

  /// Present only on sources able to receive results out of band.
  fn as_non_blocking(&self) -> Option<&dyn NonBlockingMessageSource> {
    None
  }

  fn redelivery_policy(&self) -> Option<RedeliveryPolicy> {
    None
  }
}

/// Capability of a source that accepts the outcome of a dispatch later, on
/// whatever task finished the chain, instead of on the dispatching call.
pub trait NonBlockingMessageSource: Send + Sync {
  /// Receives the result of a non-blocking dispatch. `Ok(None)` means the flow
  /// produced no response.
  fn reply(&self, result: FlowResult<Option<Event>>);
}
