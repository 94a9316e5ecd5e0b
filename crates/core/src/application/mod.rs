// Application Layer - engine, batching and method dispatch

pub mod batch;
pub mod context;
pub mod correlator;
pub mod engine;
pub mod registry;

pub use batch::{Batch, BatchRun};
pub use context::CallContext;
pub use correlator::{Correlator, Outgoing, RequestHandle, RequestOptions, Settled};
pub use engine::{EngineBuilder, RpcEngine};
pub use registry::{method_fn, parse_params, FnMethod, Method, Registry, Validator};

#[cfg(test)]
mod engine_test;
