// esbflow/src/strategy/selection.rs

//! Strategy precedence and the compatibility checks run by `Flow::validate_construct`.

use crate::error::{FlowError, FlowResult};
use crate::strategy::definition::{ProcessingStrategy, ResolvedStrategy, StrategySource};
use tracing::{event, Level};

/// The facts about a flow's message source that strategy validation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceCapabilities {
  pub supports_non_blocking: bool,
  pub redelivery_configured: bool,
}

/// Picks the strategy by precedence: explicit, then container default, then
/// the engine default.
pub fn resolve_processing_strategy(
  explicit: Option<ProcessingStrategy>,
  container_default: Option<ProcessingStrategy>,
) -> ResolvedStrategy {
  match (explicit, container_default) {
    (Some(strategy), _) => ResolvedStrategy {
      strategy,
      source: StrategySource::Explicit,
    },
    (None, Some(strategy)) => ResolvedStrategy {
      strategy,
      source: StrategySource::ContainerDefault,
    },
    (None, None) => ResolvedStrategy {
      strategy: ProcessingStrategy::Default,
      source: StrategySource::EngineDefault,
    },
  }
}

/// Checks `resolved` against the source's capabilities.
///
/// - Non-blocking with a source lacking the non-blocking capability fails.
/// - With a redelivery policy configured:
///   - an explicitly chosen asynchronous strategy fails,
///   - an asynchronous strategy taken from a default falls back to synchronous,
///   - the engine default and non-blocking fall back to synchronous,
///   - synchronous is kept.
///
/// The non-blocking source check runs first and is never relaxed.
pub fn validate_processing_strategy(
  flow_name: &str,
  resolved: ResolvedStrategy,
  capabilities: SourceCapabilities,
) -> FlowResult<ResolvedStrategy> {
  if resolved.strategy.is_non_blocking() && !capabilities.supports_non_blocking {
    return Err(FlowError::construct_invalid(
      flow_name,
      "the non-blocking processing strategy requires a message source that supports non-blocking delivery",
    ));
  }

  if !capabilities.redelivery_configured {
    return Ok(resolved);
  }

  match resolved.strategy {
    ProcessingStrategy::Synchronous => Ok(resolved),
    ProcessingStrategy::Asynchronous(_) if resolved.source == StrategySource::Explicit => {
      Err(FlowError::construct_invalid(
        flow_name,
        "an asynchronous processing strategy cannot be used with a redelivery policy on the message source",
      ))
    }
    other => {
      event!(
        Level::WARN,
        flow = %flow_name,
        configured = %other,
        "Redelivery policy present on the message source; using the synchronous processing strategy instead."
      );
      Ok(ResolvedStrategy {
        strategy: ProcessingStrategy::Synchronous,
        source: resolved.source,
      })
    }
  }
}
