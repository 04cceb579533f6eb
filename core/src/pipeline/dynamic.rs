// esbflow/src/pipeline/dynamic.rs

//! Dynamic pipelines: processors injected before and after a flow's static
//! chain while the flow keeps running.

use crate::chain::ProcessorChain;
use crate::core::lifecycle::{self, LifecycleMember, LifecycleState};
use crate::core::processor::{processor_key, Processor};
use crate::error::{FlowError, FlowResult};
use crate::pipeline::definition::Flow;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// The overlay currently applied to a flow, if any.
#[derive(Default)]
pub(crate) struct OverlayState {
  pub(crate) id: Option<String>,
  pub(crate) before: Vec<Arc<dyn Processor>>,
  pub(crate) after: Vec<Arc<dyn Processor>>,
}

impl OverlayState {
  pub(crate) fn processors(&self) -> impl Iterator<Item = &Arc<dyn Processor>> {
    self.before.iter().chain(self.after.iter())
  }

  /// Overlay processors not already in `seen`, each listed once.
  pub(crate) fn members(&self, mut seen: HashSet<usize>) -> Vec<LifecycleMember<'_>> {
    self
      .processors()
      .filter(|p| seen.insert(processor_key(p.as_ref())))
      .map(|p| (p.name(), p.lifecycle()))
      .collect()
  }
}

/// Handle for editing one dynamic pipeline of a flow.
///
/// Injections only accumulate in the handle. Nothing reaches the flow until
/// `reset_and_update()` publishes `before ++ static chain ++ after` as the
/// effective chain, replacing any overlay applied under the same id.
/// `reset()` reverts the flow to its static chain.
pub struct DynamicPipelineBuilder<'flow> {
  flow: &'flow Flow,
  id: String,
  before: Vec<Arc<dyn Processor>>,
  after: Vec<Arc<dyn Processor>>,
}

impl<'flow> DynamicPipelineBuilder<'flow> {
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Appends processors to run before the static chain.
  pub fn inject_before(mut self, processors: impl IntoIterator<Item = Arc<dyn Processor>>) -> Self {
    self.before.extend(processors);
    self
  }

  /// Appends processors to run after the static chain.
  pub fn inject_after(mut self, processors: impl IntoIterator<Item = Arc<dyn Processor>>) -> Self {
    self.after.extend(processors);
    self
  }

  /// Publishes the injected processors as the flow's effective chain and
  /// returns the pipeline id to resume editing with.
  pub fn reset_and_update(self) -> FlowResult<String> {
    self.flow.publish_overlay(&self.id, self.before, self.after)?;
    Ok(self.id)
  }

  /// Removes any applied overlay and returns the pipeline id.
  pub fn reset(self) -> FlowResult<String> {
    self.flow.clear_overlay(&self.id)?;
    Ok(self.id)
  }
}

impl Flow {
  pub(crate) fn static_processor_keys(&self) -> HashSet<usize> {
    self.processors.iter().map(|p| processor_key(p.as_ref())).collect()
  }

  /// Opens a dynamic pipeline handle.
  ///
  /// `None` allocates a fresh id without touching any existing overlay.
  /// `Some(id)` resumes the overlay applied under `id`, or claims `id` when no
  /// overlay is applied. An id that does not own the applied overlay is rejected.
  pub fn dynamic_pipeline(&self, id: Option<&str>) -> FlowResult<DynamicPipelineBuilder<'_>> {
    let id = match id {
      None => {
        let n = self.dynamic_id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}.dynamic-pipeline.{}", self.name, n)
      }
      Some(requested) => {
        self.ensure_owns_overlay(&self.overlay.lock(), requested)?;
        requested.to_string()
      }
    };
    Ok(DynamicPipelineBuilder {
      flow: self,
      id,
      before: Vec::new(),
      after: Vec::new(),
    })
  }

  fn ensure_owns_overlay(&self, overlay: &OverlayState, id: &str) -> FlowResult<()> {
    match &overlay.id {
      Some(applied) if applied != id => Err(FlowError::InvalidDynamicPipelineId {
        flow: self.name.clone(),
        id: id.to_string(),
      }),
      _ => Ok(()),
    }
  }

  #[instrument(name = "Flow::publish_overlay", skip_all, fields(flow = %self.name, pipeline_id = %id), err(Display))]
  fn publish_overlay(&self, id: &str, before: Vec<Arc<dyn Processor>>, after: Vec<Arc<dyn Processor>>) -> FlowResult<()> {
    // Lock order: state, then overlay.
    let state = self.state.lock();
    let runtime = self.runtime().ok_or_else(|| {
      FlowError::illegal_state(&self.name, "a dynamic pipeline can only be applied to an initialised flow")
    })?;
    let mut overlay = self.overlay.lock();
    self.ensure_owns_overlay(&overlay, id)?;

    let incoming = OverlayState {
      id: Some(id.to_string()),
      before,
      after,
    };
    // Static processors and those kept from the previous overlay already run
    // under the flow's lifecycle.
    let mut known = self.static_processor_keys();
    known.extend(overlay.processors().map(|p| processor_key(p.as_ref())));
    let fresh_members = incoming.members(known);

    lifecycle::initialise_in_order(&self.name, &fresh_members)?;
    if state.is_started() {
      if let Err(e) = lifecycle::start_in_order(&self.name, &fresh_members) {
        lifecycle::dispose_in_reverse(&self.name, &fresh_members);
        return Err(e);
      }
    }

    let mut effective: Vec<Arc<dyn Processor>> = Vec::with_capacity(incoming.before.len() + incoming.after.len() + 1);
    effective.extend(incoming.before.iter().cloned());
    effective.push(runtime.static_chain.clone() as Arc<dyn Processor>);
    effective.extend(incoming.after.iter().cloned());
    runtime.publish_chain(Arc::new(ProcessorChain::new(
      format!("'{}' dynamic processor chain", self.name),
      effective,
    )));

    let retained_keys: HashSet<usize> = incoming.processors().map(|p| processor_key(p.as_ref())).collect();
    let replaced = std::mem::replace(&mut *overlay, incoming);
    self.retire_overlay_processors(*state, &replaced, &retained_keys);
    self.paths.invalidate();

    event!(Level::INFO, before = overlay.before.len(), after = overlay.after.len(), "Dynamic pipeline applied.");
    Ok(())
  }

  #[instrument(name = "Flow::clear_overlay", skip_all, fields(flow = %self.name, pipeline_id = %id), err(Display))]
  fn clear_overlay(&self, id: &str) -> FlowResult<()> {
    let state = self.state.lock();
    let mut overlay = self.overlay.lock();
    self.ensure_owns_overlay(&overlay, id)?;

    if let Some(runtime) = self.runtime() {
      runtime.publish_chain(runtime.static_chain.clone());
    }
    let replaced = std::mem::take(&mut *overlay);
    self.retire_overlay_processors(*state, &replaced, &HashSet::new());
    self.paths.invalidate();

    event!(Level::INFO, "Dynamic pipeline reset to the static chain.");
    Ok(())
  }

  // Shuts down processors of a replaced overlay that are neither static nor
  // part of the new overlay.
  fn retire_overlay_processors(&self, state: LifecycleState, replaced: &OverlayState, retained_keys: &HashSet<usize>) {
    let mut kept = self.static_processor_keys();
    kept.extend(retained_keys.iter().copied());
    let retired = replaced.members(kept);
    if state.is_started() {
      lifecycle::stop_in_reverse(&self.name, &retired);
    }
    if state.is_initialised() {
      lifecycle::dispose_in_reverse(&self.name, &retired);
    }
  }
}
