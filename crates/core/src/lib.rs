// Tether Core - transport-agnostic RPC engine
// NO wire-format or transport dependencies: codecs and transports plug in via ports

pub mod application;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{
    method_fn, parse_params, Batch, BatchRun, CallContext, EngineBuilder, Method, Outgoing,
    Registry, RequestHandle, RequestOptions, RpcEngine,
};
pub use codec::LogicalCodec;
pub use config::{CodecOptions, EngineConfig};
pub use domain::{Args, ErrorData, ErrorObject, Fault, HandlerError, Id};
pub use error::{EngineError, Result, RpcError};
pub use port::{Codec, TokenProvider, Transport, UuidTokenProvider};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
