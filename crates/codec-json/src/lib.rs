//! JSON-RPC 2.0 Codec
//!
//! Wire adapter for the Tether engine: envelopes with a `jsonrpc: "2.0"` tag,
//! batches as arrays, and redaction of internal failure detail.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::JsonRpcCodec;
pub use types::{JsonRpcWire, WireError, WireMessage, JSONRPC_VERSION};

/// Engine speaking JSON-RPC 2.0
pub type JsonRpcEngine = tether_core::RpcEngine<JsonRpcCodec>;
