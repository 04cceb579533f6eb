// esbflow/examples/dynamic_pipeline.rs

use esbflow::{from_fn, EngineConfig, Event, Flow, FlowError, ProcessingStrategy, Processor};
use std::sync::Arc;
use tracing::info;

fn tag(label: &'static str) -> Arc<dyn Processor> {
  from_fn(label, move |event: Event| async move { Ok::<_, FlowError>(event.append_payload(label)) })
}

#[tokio::main]
async fn main() -> Result<(), FlowError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Dynamic Pipeline Example ---");

  let flow = Flow::new("inventory", Arc::new(EngineConfig::default()))
    .with_processors(vec![tag(" [reserve]"), tag(" [ship]")])
    .with_processing_strategy(ProcessingStrategy::Synchronous);
  flow.initialise()?;
  flow.start()?;

  let show = |label: &'static str, event: Option<Event>| {
    info!(stage = label, payload = ?event.map(Event::into_payload), "Flow output.");
  };
  show("static", flow.process(Event::new("sku-7")).await?);

  // Wrap the static chain with tracing processors while the flow keeps running.
  let id = flow
    .dynamic_pipeline(None)?
    .inject_before([tag(" [trace-in]")])
    .inject_after([tag(" [trace-out]")])
    .reset_and_update()?;
  show("overlaid", flow.process(Event::new("sku-7")).await?);

  if let Some(chain) = flow.effective_chain() {
    info!(processors = chain.len(), "Effective chain size.");
  }

  // Revert to the static chain.
  flow.dynamic_pipeline(Some(&id))?.reset()?;
  show("reverted", flow.process(Event::new("sku-7")).await?);

  flow.stop()?;
  flow.dispose()?;
  Ok(())
}
