// esbflow/src/core/lifecycle.rs

//! Lifecycle capability shared by processors, sources and exception listeners,
//! and the lifecycle state machine of a flow.

use crate::error::{FlowResult, LifecyclePhase};
use std::fmt;
use tracing::{event, Level};

/// Optional lifecycle hooks of a flow component.
///
/// Every hook defaults to a no-op, so a component only overrides the phases it
/// cares about. Components expose this capability through their `lifecycle()`
/// accessor rather than through type inspection.
pub trait Lifecycle: Send + Sync {
  fn initialise(&self) -> FlowResult<()> {
    Ok(())
  }

  fn start(&self) -> FlowResult<()> {
    Ok(())
  }

  fn stop(&self) -> FlowResult<()> {
    Ok(())
  }

  fn dispose(&self) -> FlowResult<()> {
    Ok(())
  }
}

/// Lifecycle state of a flow.
///
/// Transitions are forward only, except that `Started` and `Stopped` may cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  NotInitialised,
  Initialised,
  Started,
  Stopped,
  Disposed,
}

impl LifecycleState {
  pub fn is_initialised(&self) -> bool {
    !matches!(self, LifecycleState::NotInitialised | LifecycleState::Disposed)
  }

  pub fn is_started(&self) -> bool {
    matches!(self, LifecycleState::Started)
  }
}

impl fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      LifecycleState::NotInitialised => "not initialised",
      LifecycleState::Initialised => "initialised",
      LifecycleState::Started => "started",
      LifecycleState::Stopped => "stopped",
      LifecycleState::Disposed => "disposed",
    };
    f.write_str(label)
  }
}

/// Runs `phase` on a component if it exposes lifecycle hooks.
pub(crate) fn apply_phase(lifecycle: Option<&dyn Lifecycle>, phase: LifecyclePhase) -> FlowResult<()> {
  match lifecycle {
    None => Ok(()),
    Some(lc) => match phase {
      LifecyclePhase::Initialise => lc.initialise(),
      LifecyclePhase::Start => lc.start(),
      LifecyclePhase::Stop => lc.stop(),
      LifecyclePhase::Dispose => lc.dispose(),
    },
  }
}

/// Runs a shutdown phase and logs a failure instead of returning it.
pub(crate) fn apply_phase_safely(owner: &str, component: &str, lifecycle: Option<&dyn Lifecycle>, phase: LifecyclePhase) {
  if let Err(e) = apply_phase(lifecycle, phase) {
    event!(
      Level::WARN,
      owner = %owner,
      component = %component,
      %phase,
      error = %e,
      "Component failed during shutdown phase; continuing with the remaining components."
    );
  }
}

/// A component taking part in an ordered lifecycle walk.
pub(crate) type LifecycleMember<'a> = (&'a str, Option<&'a dyn Lifecycle>);

/// Initialises `members` in order. On failure, the members initialised so far
/// are disposed in reverse order and the original error is returned.
pub(crate) fn initialise_in_order(owner: &str, members: &[LifecycleMember<'_>]) -> FlowResult<()> {
  for (idx, (name, lifecycle)) in members.iter().enumerate() {
    if let Err(e) = apply_phase(*lifecycle, LifecyclePhase::Initialise) {
      event!(Level::ERROR, owner = %owner, component = %name, error = %e, "Initialisation failed; disposing initialised components.");
      for (done_name, done_lifecycle) in members[..idx].iter().rev() {
        apply_phase_safely(owner, done_name, *done_lifecycle, LifecyclePhase::Dispose);
      }
      return Err(e);
    }
  }
  Ok(())
}

/// Starts `members` in order. On failure, every member started so far, the
/// failing one included, is stopped in reverse order (best-effort) and the
/// original start error is returned unchanged.
pub(crate) fn start_in_order(owner: &str, members: &[LifecycleMember<'_>]) -> FlowResult<()> {
  for (idx, (name, lifecycle)) in members.iter().enumerate() {
    if let Err(e) = apply_phase(*lifecycle, LifecyclePhase::Start) {
      event!(Level::ERROR, owner = %owner, component = %name, error = %e, "Start failed; stopping started components.");
      for (started_name, started_lifecycle) in members[..=idx].iter().rev() {
        apply_phase_safely(owner, started_name, *started_lifecycle, LifecyclePhase::Stop);
      }
      return Err(e);
    }
  }
  Ok(())
}

/// Stops `members` in reverse order, logging and skipping individual failures.
pub(crate) fn stop_in_reverse(owner: &str, members: &[LifecycleMember<'_>]) {
  for (name, lifecycle) in members.iter().rev() {
    apply_phase_safely(owner, name, *lifecycle, LifecyclePhase::Stop);
  }
}

/// Disposes `members` in reverse order, logging and skipping individual failures.
pub(crate) fn dispose_in_reverse(owner: &str, members: &[LifecycleMember<'_>]) {
  for (name, lifecycle) in members.iter().rev() {
    apply_phase_safely(owner, name, *lifecycle, LifecyclePhase::Dispose);
  }
}
