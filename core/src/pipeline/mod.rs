// esbflow/src/pipeline/mod.rs

//! Defines the `Flow` struct: construction, lifecycle, execution, dynamic
//! pipelines and processor path introspection.

pub mod definition;
pub mod dynamic;
pub mod execution;
pub mod lifecycle;
pub mod path;

// Re-export the main Flow struct
pub use definition::Flow;
pub use dynamic::DynamicPipelineBuilder;
pub use execution::FlowListener;
