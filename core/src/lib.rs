// src/lib.rs

//! esbflow: the flow processing engine of an enterprise service bus.
//!
//! A flow wires a message source to an ordered chain of processors and
//! executes it under a processing strategy:
//!  - Synchronous, asynchronous (bounded worker pool) and non-blocking execution.
//!  - Strategy validation against the capabilities of the message source.
//!  - Dynamic pipelines that inject processors around the static chain while
//!    traffic flows, published as atomic snapshots.
//!  - Processor path introspection, including processors nested in containers.
//!  - Ordered lifecycle with rollback when a component fails to start.
//!  - A name-keyed container driving the lifecycle of many flows.

pub mod chain;
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod strategy;

// --- Re-exports for the Public API ---

pub use crate::core::{
  from_fn, CatchExceptionListener, Event, ExceptionListener, FnProcessor, Lifecycle, LifecycleState,
  LoggingExceptionListener, MessageExchangePattern, MessageSource, NonBlockingMessageSource, PathContainer,
  Processor, RedeliveryPolicy, ResponsePhase,
};

pub use crate::chain::{ProcessorChain, ProcessorChainBuilder, ResponseMessageProcessorAdapter};

// The main Flow struct and the handle for editing its dynamic pipeline
pub use crate::pipeline::{DynamicPipelineBuilder, Flow, FlowListener};

pub use crate::strategy::{AsyncSettings, ProcessingStrategy, ResolvedStrategy, StrategySource};

pub use crate::config::EngineConfig;

pub use crate::error::{FlowError, FlowResult, LifecyclePhase};

// The container for managing many flows
pub use crate::registry::FlowContainer;

/*
    Typical use:
    1. Build an `EngineConfig` (or `EngineConfig::from_env()`) and a `FlowContainer`.
    2. Create a flow with `container.new_flow("name")`, then set its source,
       processors, processing strategy and exception listener.
    3. Register it, call `initialise_all()` and `start_all()`.
    4. Feed events through `flow.process(event)` or from the source's `FlowListener`.
    5. Use `flow.dynamic_pipeline(None)` to inject processors at runtime.
    6. Shut down with `stop_all()` and `dispose_all()`.
*/
