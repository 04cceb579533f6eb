// esbflow/src/registry.rs

//! Defines `FlowContainer`, a name-keyed registry that owns the container-wide
//! configuration and drives the lifecycle of every registered flow.

use crate::config::EngineConfig;
use crate::core::event::Event;
use crate::error::{FlowError, FlowResult};
use crate::pipeline::definition::Flow;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

const CONTAINER_OWNER: &str = "<container>";

#[derive(Default)]
struct Registry {
  flows: HashMap<String, Arc<Flow>>,
  // Registration order; flows start in this order and stop in reverse.
  order: Vec<String>,
}

/// The host container of a set of flows.
pub struct FlowContainer {
  config: Arc<EngineConfig>,
  registry: Mutex<Registry>,
}

impl FlowContainer {
  /// Creates a new, empty container.
  pub fn new(config: EngineConfig) -> Self {
    Self {
      config: Arc::new(config),
      registry: Mutex::new(Registry::default()),
    }
  }

  pub fn config(&self) -> &Arc<EngineConfig> {
    &self.config
  }

  /// Creates a flow bound to this container's configuration. The flow still
  /// has to be configured and registered.
  pub fn new_flow(&self, name: impl Into<String>) -> Flow {
    Flow::new(name, Arc::clone(&self.config))
  }

  /// Registers `flow` under its name. Names are unique within a container.
  pub fn register(&self, flow: Flow) -> FlowResult<Arc<Flow>> {
    let mut registry = self.registry.lock();
    if registry.flows.contains_key(flow.name()) {
      return Err(FlowError::illegal_state(
        CONTAINER_OWNER,
        format!("a flow named '{}' is already registered", flow.name()),
      ));
    }
    event!(Level::DEBUG, flow = %flow.name(), "Registering flow.");
    let name = flow.name().to_string();
    let flow = Arc::new(flow);
    registry.order.push(name.clone());
    registry.flows.insert(name, Arc::clone(&flow));
    Ok(flow)
  }

  pub fn flow(&self, name: &str) -> Option<Arc<Flow>> {
    self.registry.lock().flows.get(name).cloned()
  }

  pub fn flow_names(&self) -> Vec<String> {
    self.registry.lock().order.clone()
  }

  fn flows_in_order(&self) -> Vec<Arc<Flow>> {
    let registry = self.registry.lock();
    registry
      .order
      .iter()
      .filter_map(|name| registry.flows.get(name).cloned())
      .collect()
  }

  /// Processes `event` through the flow registered as `flow_name`.
  pub async fn process(&self, flow_name: &str, event: Event) -> FlowResult<Option<Event>> {
    let flow = self.flow(flow_name).ok_or_else(|| {
      event!(Level::ERROR, flow = %flow_name, "No flow registered under this name.");
      FlowError::illegal_state(CONTAINER_OWNER, format!("no flow named '{}' is registered", flow_name))
    })?;
    flow.process(event).await
  }

  /// Initialises every flow in registration order, stopping at the first failure.
  #[instrument(name = "FlowContainer::initialise_all", skip_all, err(Display))]
  pub fn initialise_all(&self) -> FlowResult<()> {
    for flow in self.flows_in_order() {
      flow.initialise()?;
    }
    Ok(())
  }

  /// Starts every flow in registration order. If one fails, the flows already
  /// started are stopped in reverse order and the original error is returned.
  #[instrument(name = "FlowContainer::start_all", skip_all, err(Display))]
  pub fn start_all(&self) -> FlowResult<()> {
    let flows = self.flows_in_order();
    for (idx, flow) in flows.iter().enumerate() {
      if let Err(e) = flow.start() {
        event!(Level::ERROR, flow = %flow.name(), error = %e, "Flow failed to start; stopping flows already started.");
        for started in flows[..idx].iter().rev() {
          if let Err(stop_err) = started.stop() {
            event!(Level::WARN, flow = %started.name(), error = %stop_err, "Flow failed to stop during rollback.");
          }
        }
        return Err(e);
      }
    }
    Ok(())
  }

  /// Stops every flow in reverse registration order, best-effort.
  #[instrument(name = "FlowContainer::stop_all", skip_all)]
  pub fn stop_all(&self) {
    for flow in self.flows_in_order().iter().rev() {
      if let Err(e) = flow.stop() {
        event!(Level::WARN, flow = %flow.name(), error = %e, "Flow failed to stop; continuing.");
      }
    }
  }

  /// Disposes every flow in reverse registration order, best-effort. Flows
  /// that cannot be disposed in their current state are logged and skipped.
  #[instrument(name = "FlowContainer::dispose_all", skip_all)]
  pub fn dispose_all(&self) {
    for flow in self.flows_in_order().iter().rev() {
      if let Err(e) = flow.dispose() {
        event!(Level::WARN, flow = %flow.name(), error = %e, "Flow failed to dispose; continuing.");
      }
    }
  }
}

impl Default for FlowContainer {
  fn default() -> Self {
    Self::new(EngineConfig::default())
  }
}
