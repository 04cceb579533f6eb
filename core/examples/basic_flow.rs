// esbflow/examples/basic_flow.rs

use esbflow::{
  from_fn, EngineConfig, Event, FlowContainer, FlowError, ProcessingStrategy, Processor, ResponseMessageProcessorAdapter,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), FlowError> {
  // Initialize tracing (optional, for demonstration)
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Flow Example ---");

  // 1. A container carries the defaults shared by its flows.
  let config = EngineConfig::from_env()?.with_default_processing_strategy(ProcessingStrategy::Synchronous);
  let container = FlowContainer::new(config);

  // 2. Build the processors. The response adapter runs after everything downstream.
  let validate = from_fn("validate", |event: Event| async move {
    if event.payload().is_empty() {
      return Err(anyhow::anyhow!("empty order"));
    }
    Ok(event.with_variable("validated", "true"))
  });
  let enrich = from_fn("enrich", |event: Event| async move { Ok::<_, FlowError>(event.append_payload(" +customer")) });
  let audit = from_fn("audit", |event: Event| async move {
    info!(payload = %event.payload(), "Response leaving the flow.");
    Ok::<_, FlowError>(event.append_payload(" [audited]"))
  });

  // 3. Configure and register the flow.
  let flow = container
    .new_flow("orders")
    .with_processors(vec![Arc::new(ResponseMessageProcessorAdapter::new(audit)) as Arc<dyn Processor>, validate, enrich]);
  container.register(flow)?;

  // 4. Bring every flow up.
  container.initialise_all()?;
  container.start_all()?;

  // 5. Send a few events through.
  match container.process("orders", Event::new("order-42")).await? {
    Some(response) => info!(payload = %response.payload(), validated = ?response.variable("validated"), "Order processed."),
    None => info!("Order accepted without a response."),
  }
  if let Err(e) = container.process("orders", Event::new("")).await {
    info!(error = %e, "Empty order rejected as expected.");
  }

  // 6. Shut down.
  container.stop_all();
  container.dispose_all();
  info!("--- Basic Flow Example Finished ---");
  Ok(())
}
