//! XML-RPC Codec
//!
//! Wire adapter for the Tether engine. XML-RPC carries no ids: requests are
//! correlated by the transport, which hands the request id back as the ack
//! hint of `RpcEngine::on_message_with_ack`.

pub mod codec;
pub mod error;
pub mod multicall;
pub mod node;
pub mod value;

pub use codec::{XmlRpcCodec, XmlRpcMessage};
pub use error::{StructureError, XmlParseError};
pub use multicall::{MulticallBatch, MulticallResult, MulticallRun};
pub use node::{DocumentParser, QuickXmlParser, XmlNode};

/// Engine speaking XML-RPC
pub type XmlRpcEngine = tether_core::RpcEngine<XmlRpcCodec>;
