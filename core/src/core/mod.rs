// esbflow/src/core/mod.rs

//! Building blocks shared by chains and flows: events, processors, sources, exception listeners and lifecycle.

pub mod event;
pub mod exception;
pub mod lifecycle;
pub mod processor;
pub mod source;

// Re-export key types for easier access from other modules (and lib.rs)
pub use event::{Event, MessageExchangePattern};
pub use exception::{CatchExceptionListener, ExceptionListener, LoggingExceptionListener};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use processor::{from_fn, FnProcessor, PathContainer, Processor, ResponsePhase};
pub use source::{MessageSource, NonBlockingMessageSource, RedeliveryPolicy};
