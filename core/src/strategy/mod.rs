// esbflow/src/strategy/mod.rs

//! Processing strategies: which one a flow uses and how it executes the chain.

pub mod definition;
pub mod pool;
pub mod selection;

pub use definition::{AsyncSettings, ProcessingStrategy, ResolvedStrategy, StrategySource};
pub use selection::{resolve_processing_strategy, validate_processing_strategy, SourceCapabilities};
