// esbflow/src/error.rs
use anyhow::Error as AnyhowError;
use std::fmt;
use thiserror::Error;

/// The lifecycle phase a component was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
  Initialise,
  Start,
  Stop,
  Dispose,
}

impl fmt::Display for LifecyclePhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      LifecyclePhase::Initialise => "initialise",
      LifecyclePhase::Start => "start",
      LifecyclePhase::Stop => "stop",
      LifecyclePhase::Dispose => "dispose",
    };
    f.write_str(label)
  }
}

#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Flow '{flow}' is not a valid construct: {message}")]
  ConstructInvalid { flow: String, message: String },

  #[error("Component '{component}' failed to {phase}. Source: {source}")]
  Lifecycle {
    component: String,
    phase: LifecyclePhase,
    #[source]
    source: AnyhowError,
  },

  #[error("Illegal state for '{flow}': {message}")]
  IllegalState { flow: String, message: String },

  #[error("Flow '{flow}' is stopped and cannot process messages")]
  NotStarted { flow: String },

  #[error("Invalid dynamic pipeline id '{id}' for flow '{flow}'")]
  InvalidDynamicPipelineId { flow: String, id: String },

  #[error("Error raised while processing a message. Source: {source}")]
  Processing {
    #[source]
    source: AnyhowError,
  },

  #[error("Flow '{flow}' could not dispatch the message: {message}")]
  Dispatch { flow: String, message: String },

  #[error("Internal flow engine error: {0}")]
  Internal(String),
}

impl FlowError {
  /// Builds a `Lifecycle` error for `component` failing in `phase`.
  pub fn lifecycle(component: impl Into<String>, phase: LifecyclePhase, source: impl Into<AnyhowError>) -> Self {
    FlowError::Lifecycle {
      component: component.into(),
      phase,
      source: source.into(),
    }
  }

  pub fn construct_invalid(flow: impl Into<String>, message: impl Into<String>) -> Self {
    FlowError::ConstructInvalid {
      flow: flow.into(),
      message: message.into(),
    }
  }

  pub fn illegal_state(flow: impl Into<String>, message: impl Into<String>) -> Self {
    FlowError::IllegalState {
      flow: flow.into(),
      message: message.into(),
    }
  }
}

// Errors raised by user processors arrive as anyhow::Error. A FlowError that was
// boxed into anyhow on the way is unwrapped instead of nested.
impl From<AnyhowError> for FlowError {
  fn from(err: AnyhowError) -> Self {
    match err.downcast::<FlowError>() {
      Ok(flow_err) => flow_err,
      Err(other) => FlowError::Processing { source: other },
    }
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;
