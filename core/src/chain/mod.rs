// esbflow/src/chain/mod.rs

//! Processor chains: linear composition of processors with uniform error
//! propagation and response-phase unwinding.

pub mod definition;
pub mod response;

pub use definition::{ProcessorChain, ProcessorChainBuilder};
pub use response::ResponseMessageProcessorAdapter;
